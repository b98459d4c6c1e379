//! The per-request invocation pipeline.
//!
//! [`Orchestrator::invoke`] drives auth-policy → guard-in → provider →
//! guard-out → completion over an immutable [`RequestContext`], recording
//! interaction stages and telemetry along the way. Business failures
//! (policy, content, upstream) are fail-soft: the method returns an
//! `Ok(InvokeResponse)` with `success=false` and a stable `reason_code`, and
//! `model_used` names the terminal step. Only shape errors and credential
//! problems surface as `Err` (native 4xx), and only before the
//! `request_start` event is recorded — every started request records exactly
//! one completion.

use std::sync::Arc;
use std::time::Duration;

use bx_warden::outcome::ContentType;
use bx_warden::rule::{GuardrailRule, RuleAction};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::auth::Principal;
use crate::context::{RequestContext, TelemetryHeaders};
use crate::error::{BrokerError, ErrorCategory, reason};
use crate::guardrails::GuardrailService;
use crate::provider::{ChatMessage, InvocationParams, ProviderAdapter, ProviderError};
use crate::stores::{ModelCatalog, ProjectStore};
use crate::telemetry::{
    InteractionStage, StageKind, TelemetryEvent, TelemetryPayload, TelemetryWriter,
};

// ── Request / response shapes ──────────────────────────────────────────

/// Requested operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Single chat completion.
    Chat,
    /// Streaming — accepted in the shape, not supported by this broker.
    Stream,
    /// Batch — treated as a single chat payload.
    Batch,
}

/// Invocation payload body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokePayload {
    /// Primary shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    /// Compatibility shape, converted to a single user message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Completion token cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl InvokePayload {
    fn to_messages(&self) -> Result<Vec<ChatMessage>, BrokerError> {
        if let Some(messages) = &self.messages {
            if messages.is_empty() {
                return Err(BrokerError::Validation("messages is empty".into()));
            }
            return Ok(messages.clone());
        }
        if let Some(prompt) = &self.prompt {
            return Ok(vec![ChatMessage::user(prompt.clone())]);
        }
        Err(BrokerError::Validation(
            "payload must carry messages or prompt".into(),
        ))
    }

    fn params(&self) -> InvocationParams {
        InvocationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// `/llm/invoke` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct InvokeRequest {
    /// Operation kind.
    pub operation: Operation,
    /// Requested model id.
    pub model: String,
    /// Payload body.
    pub payload: InvokePayload,
    /// Project the caller claims; must match the verified principal.
    pub project_id: String,
    /// Caller-supplied transient rules, validated before use.
    #[serde(default)]
    pub custom_guardrails: Vec<GuardrailRule>,
    /// Caller-supplied correlation id; generated when absent. Not a
    /// deduplication key — resubmission yields an independent completion.
    #[serde(default)]
    pub request_id: Option<Uuid>,
}

/// Token accounting echoed to the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InvokeUsage {
    /// Prompt-side tokens.
    pub prompt_tokens: u64,
    /// Completion-side tokens.
    pub completion_tokens: u64,
    /// Total tokens.
    pub total_tokens: u64,
    /// Cost estimate in USD, absent for uncatalogued models.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

/// `/llm/invoke` response envelope, for success and fail-soft alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeResponse {
    /// End-to-end success flag.
    pub success: bool,
    /// Correlation id.
    pub request_id: Uuid,
    /// Model used, or the terminal step label on failure.
    pub model_used: String,
    /// Stable reason code on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    /// Assistant text on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Token accounting when the adapter supplied it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<InvokeUsage>,
    /// Whether any guardrail fired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardrails_triggered: Option<bool>,
    /// Ids of every rule that fired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_rules: Option<Vec<String>>,
}

// ── Orchestrator ───────────────────────────────────────────────────────

/// Drives the invocation pipeline.
pub struct Orchestrator {
    projects: Arc<ProjectStore>,
    models: Arc<ModelCatalog>,
    guardrails: Arc<GuardrailService>,
    provider: Arc<dyn ProviderAdapter>,
    telemetry: Arc<TelemetryWriter>,
    provider_timeout: Duration,
}

impl Orchestrator {
    /// Build the orchestrator.
    #[must_use]
    pub fn new(
        projects: Arc<ProjectStore>,
        models: Arc<ModelCatalog>,
        guardrails: Arc<GuardrailService>,
        provider: Arc<dyn ProviderAdapter>,
        telemetry: Arc<TelemetryWriter>,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            projects,
            models,
            guardrails,
            provider,
            telemetry,
            provider_timeout,
        }
    }

    /// Run one invocation for a verified principal.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] only for shape and credential violations that
    /// precede the pipeline; every business failure is a fail-soft
    /// `Ok(InvokeResponse)`.
    pub async fn invoke(
        &self,
        principal: &Principal,
        request: InvokeRequest,
        headers: TelemetryHeaders,
    ) -> Result<InvokeResponse, BrokerError> {
        if request.operation == Operation::Stream {
            return Err(BrokerError::Validation(
                "streaming is not supported; use operation=chat".into(),
            ));
        }
        if request.project_id.to_lowercase() != principal.project_id {
            return Err(BrokerError::Authentication {
                code: "auth_invalid",
            });
        }
        let mut messages = request.payload.to_messages()?;

        let payload_json =
            serde_json::to_value(&request.payload).unwrap_or_else(|_| json!({}));
        let ctx = RequestContext::new(
            request.request_id.unwrap_or_else(Uuid::new_v4),
            principal.project_id.clone(),
            request.model.clone(),
            &payload_json,
            headers,
        );

        self.record(TelemetryPayload::RequestStart {
            request_id: ctx.request_id,
            project_id: ctx.project_id.clone(),
            model_id: ctx.model_id.clone(),
            payload_hash: ctx.payload_hash.clone(),
        })
        .await?;

        // 1. Policy: the model must be on the project's allow-list. The
        // provider is never consulted otherwise.
        let allowed = self
            .projects
            .get(&ctx.project_id)
            .is_some_and(|p| p.allows_model(&ctx.model_id));
        if !allowed {
            tracing::warn!(
                request_id = %ctx.request_id,
                project_id = %ctx.project_id,
                model_id = %ctx.model_id,
                "model not in project allow-list"
            );
            return self
                .fail_soft(&ctx, ErrorCategory::Authorization, reason::POLICY_BLOCKED, reason::POLICY_BLOCKED, false, None)
                .await;
        }

        // 2. Interaction stage: auth_ok.
        self.stage(
            &ctx,
            StageKind::Auth,
            "principal verified, model allowed",
            "ok",
            None,
        )
        .await;

        // 3. Guard-in over a transient composition of base + custom rules.
        let base = self.guardrails.snapshot();
        let rules = match self.guardrails.compose(&base, request.custom_guardrails) {
            Ok(rules) => rules,
            Err(err) => {
                tracing::warn!(request_id = %ctx.request_id, %err, "custom guardrails rejected");
                return self
                    .fail_soft(&ctx, ErrorCategory::Validation, reason::VALIDATION_ERROR, reason::VALIDATION_ERROR, false, None)
                    .await;
            }
        };

        let prompt_text = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let guard_in = self
            .guardrails
            .evaluate(
                rules.clone(),
                &prompt_text,
                ContentType::Prompt,
                ctx.request_id,
                &ctx.project_id,
            )
            .await;
        self.stage(
            &ctx,
            StageKind::GuardIn,
            guard_in.result.reason.clone(),
            if guard_in.result.allowed { "ok" } else { "blocked" },
            Some(json!({"triggered": guard_in.result.triggered_rules})),
        )
        .await;

        let mut triggered: Vec<String> = guard_in.result.triggered_rules.clone();

        if !guard_in.result.allowed {
            return self
                .fail_soft(
                    &ctx,
                    ErrorCategory::GuardrailBlocked,
                    reason::GUARDRAIL_BLOCKED,
                    reason::GUARDRAIL_BLOCKED,
                    true,
                    Some(triggered),
                )
                .await;
        }
        if guard_in.result.action == RuleAction::Sanitize {
            for message in &mut messages {
                message.content = self.guardrails.sanitize_only(
                    &rules,
                    &message.content,
                    ContentType::Prompt,
                    &ctx.project_id,
                );
            }
        }

        // 4. Provider call under the configured deadline.
        let reply = match tokio::time::timeout(
            self.provider_timeout,
            self.provider
                .invoke(&ctx.model_id, &messages, &request.payload.params()),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(provider_err)) => {
                return self.provider_failed(&ctx, &provider_err, &triggered).await;
            }
            Err(_elapsed) => {
                let provider_err = ProviderError::Timeout {
                    seconds: self.provider_timeout.as_secs(),
                };
                return self.provider_failed(&ctx, &provider_err, &triggered).await;
            }
        };
        self.stage(
            &ctx,
            StageKind::ProviderCall,
            format!("model '{}' answered", ctx.model_id),
            "ok",
            reply
                .usage
                .map(|u| json!({"total_tokens": u.total_tokens})),
        )
        .await;

        // 5. Guard-out over the provider's response text.
        let guard_out = self
            .guardrails
            .evaluate(
                rules.clone(),
                &reply.content,
                ContentType::Response,
                ctx.request_id,
                &ctx.project_id,
            )
            .await;
        self.stage(
            &ctx,
            StageKind::GuardOut,
            guard_out.result.reason.clone(),
            if guard_out.result.allowed { "ok" } else { "blocked" },
            Some(json!({"triggered": guard_out.result.triggered_rules})),
        )
        .await;
        triggered.extend(guard_out.result.triggered_rules.iter().cloned());

        if !guard_out.result.allowed {
            self.capture_raw(&ctx, &reply.raw).await;
            return self
                .fail_soft(
                    &ctx,
                    ErrorCategory::GuardrailBlocked,
                    reason::GUARDRAIL_BLOCKED,
                    reason::GUARDRAIL_BLOCKED,
                    true,
                    Some(triggered),
                )
                .await;
        }
        let content = if guard_out.result.action == RuleAction::Sanitize {
            guard_out
                .result
                .sanitized_content
                .clone()
                .unwrap_or_else(|| reply.content.clone())
        } else {
            reply.content.clone()
        };

        // 6. Completion.
        let usage = reply.usage.map(|u| InvokeUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
            cost_usd: self.models.estimate_cost(
                &ctx.model_id,
                u.prompt_tokens,
                u.completion_tokens,
            ),
        });
        let guardrails_triggered = !triggered.is_empty();
        self.record(TelemetryPayload::RequestComplete {
            request_id: ctx.request_id,
            project_id: ctx.project_id.clone(),
            success: true,
            model_used: ctx.model_id.clone(),
            duration_ms: ctx.elapsed_ms(),
            prompt_tokens: usage.map(|u| u.prompt_tokens),
            completion_tokens: usage.map(|u| u.completion_tokens),
            total_tokens: usage.map(|u| u.total_tokens),
            cost_usd: usage.and_then(|u| u.cost_usd),
            guardrails_triggered,
        })
        .await?;

        Ok(InvokeResponse {
            success: true,
            request_id: ctx.request_id,
            model_used: ctx.model_id.clone(),
            reason_code: None,
            content: Some(content),
            usage,
            guardrails_triggered: Some(guardrails_triggered),
            triggered_rules: guardrails_triggered.then_some(triggered),
        })
    }

    async fn provider_failed(
        &self,
        ctx: &RequestContext,
        err: &ProviderError,
        triggered: &[String],
    ) -> Result<InvokeResponse, BrokerError> {
        tracing::warn!(request_id = %ctx.request_id, %err, "provider call failed");
        if let Some(raw) = err.raw() {
            self.capture_raw(ctx, raw).await;
        }
        self.stage(ctx, StageKind::ProviderCall, err.to_string(), "error", None)
            .await;
        self.fail_soft(
            ctx,
            ErrorCategory::ProviderError,
            err.reason_code(),
            reason::PROVIDER_ERROR,
            !triggered.is_empty(),
            (!triggered.is_empty()).then(|| triggered.to_vec()),
        )
        .await
    }

    /// Compose a fail-soft envelope and record the error + completion pair.
    /// `model_used` mirrors the terminal step label.
    async fn fail_soft(
        &self,
        ctx: &RequestContext,
        category: ErrorCategory,
        reason_code: &str,
        model_used: &str,
        guardrails_triggered: bool,
        triggered_rules: Option<Vec<String>>,
    ) -> Result<InvokeResponse, BrokerError> {
        self.record(TelemetryPayload::Error {
            request_id: Some(ctx.request_id),
            project_id: Some(ctx.project_id.clone()),
            category: category.as_str().to_string(),
            code: reason_code.to_string(),
        })
        .await?;
        self.record(TelemetryPayload::RequestComplete {
            request_id: ctx.request_id,
            project_id: ctx.project_id.clone(),
            success: false,
            model_used: model_used.to_string(),
            duration_ms: ctx.elapsed_ms(),
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            cost_usd: None,
            guardrails_triggered,
        })
        .await?;

        Ok(InvokeResponse {
            success: false,
            request_id: ctx.request_id,
            model_used: model_used.to_string(),
            reason_code: Some(reason_code.to_string()),
            content: None,
            usage: None,
            guardrails_triggered: Some(guardrails_triggered),
            triggered_rules,
        })
    }

    async fn capture_raw(&self, ctx: &RequestContext, raw: &serde_json::Value) {
        if let Err(error) = self.telemetry.store_raw_response(ctx.request_id, raw).await {
            tracing::error!(request_id = %ctx.request_id, %error, "failed to store raw capture");
        }
    }

    async fn stage(
        &self,
        ctx: &RequestContext,
        stage: StageKind,
        summary: impl Into<String>,
        result: &str,
        metadata: Option<serde_json::Value>,
    ) {
        let entry = InteractionStage::now(ctx.request_id, stage, summary, result, metadata);
        if let Err(error) = self.telemetry.record_interaction(entry).await {
            tracing::error!(request_id = %ctx.request_id, %error, "failed to append interaction stage");
        }
    }

    async fn record(&self, payload: TelemetryPayload) -> Result<(), BrokerError> {
        self.telemetry
            .record_event(TelemetryEvent::now(payload))
            .await
            .map_err(|e| BrokerError::Internal(format!("telemetry append failed: {e}")))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
