//! Guardrail evaluation with audit emission.
//!
//! `bx-warden` stays pure; this service owns the side effects. It captures a
//! rule-set snapshot per request, composes caller-provided custom rules into
//! a transient set (never the shared one), runs the engine, and appends one
//! guardrail event per trigger — with bounded excerpts — through the
//! telemetry writer. Engine faults are additionally reported as critical
//! events; the engine has already failed the evaluation closed.

use std::sync::Arc;

use bx_warden::engine::GuardEngine;
use bx_warden::outcome::{ContentType, Evaluation};
use bx_warden::rule::{GuardrailRule, Severity};
use bx_warden::ruleset::CompiledRuleSet;
use bx_warden::store::RuleStore;
use chrono::Utc;
use uuid::Uuid;

use crate::error::BrokerError;
use crate::telemetry::events::EXCERPT_BUDGET;
use crate::telemetry::{GuardrailEvent, TelemetryWriter, ViolationDetails, events};

/// Evaluates content and records the audit trail.
pub struct GuardrailService {
    rules: Arc<RuleStore>,
    telemetry: Arc<TelemetryWriter>,
}

impl GuardrailService {
    /// Build the service.
    #[must_use]
    pub fn new(rules: Arc<RuleStore>, telemetry: Arc<TelemetryWriter>) -> Self {
        Self { rules, telemetry }
    }

    /// Snapshot the base rule set for one request.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CompiledRuleSet> {
        self.rules.snapshot()
    }

    /// Compose a transient rule set: the given snapshot plus caller-provided
    /// custom rules. The shared set is never touched.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Validation`] when a custom rule is invalid
    /// (bad regex, colliding id, unmatchable sanitize).
    pub fn compose(
        &self,
        base: &CompiledRuleSet,
        custom: Vec<GuardrailRule>,
    ) -> Result<Arc<CompiledRuleSet>, BrokerError> {
        if custom.is_empty() {
            return Ok(Arc::new(base.clone()));
        }
        base.with_additional(custom)
            .map(Arc::new)
            .map_err(|e| BrokerError::Validation(format!("invalid custom guardrail: {e}")))
    }

    /// Evaluate `content` against `rules` and append one guardrail event per
    /// trigger (and per engine fault) for the request.
    pub async fn evaluate(
        &self,
        rules: Arc<CompiledRuleSet>,
        content: &str,
        content_type: ContentType,
        request_id: Uuid,
        project_id: &str,
    ) -> Evaluation {
        let evaluation = GuardEngine::new(rules).evaluate(content, content_type, project_id);

        for trigger in &evaluation.triggers {
            let event = GuardrailEvent {
                event_id: Uuid::new_v4(),
                timestamp: Utc::now(),
                request_id,
                project_id: project_id.to_string(),
                rule_id: trigger.rule_id.clone(),
                action: trigger.action,
                severity: trigger.severity,
                content_type,
                violation_details: ViolationDetails {
                    matched_keywords: trigger.matched_keywords.clone(),
                    matched_patterns: trigger.matched_patterns.clone(),
                    excerpt: events::excerpt(&trigger.excerpt, EXCERPT_BUDGET),
                },
            };
            self.append(event).await;
        }

        for fault in &evaluation.faults {
            let event = GuardrailEvent {
                event_id: Uuid::new_v4(),
                timestamp: Utc::now(),
                request_id,
                project_id: project_id.to_string(),
                rule_id: fault.rule_id.clone(),
                action: bx_warden::rule::RuleAction::Block,
                severity: Severity::Critical,
                content_type,
                violation_details: ViolationDetails {
                    matched_keywords: vec![],
                    matched_patterns: vec![],
                    excerpt: events::excerpt(&fault.detail, EXCERPT_BUDGET),
                },
            };
            tracing::error!(rule_id = %fault.rule_id, "guardrail engine fault, request blocked");
            self.append(event).await;
        }

        evaluation
    }

    /// Sanitize `text` under an already-decided rule set without emitting
    /// events — used to scrub individual messages after the decision
    /// evaluation already recorded its triggers.
    #[must_use]
    pub fn sanitize_only(
        &self,
        rules: &Arc<CompiledRuleSet>,
        text: &str,
        content_type: ContentType,
        project_id: &str,
    ) -> String {
        let evaluation =
            GuardEngine::new(rules.clone()).evaluate(text, content_type, project_id);
        evaluation
            .result
            .sanitized_content
            .unwrap_or_else(|| text.to_string())
    }

    async fn append(&self, event: GuardrailEvent) {
        if let Err(error) = self.telemetry.record_guardrail(event).await {
            tracing::error!(%error, "failed to append guardrail event");
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
