//! Event model for the three audit streams.
//!
//! Events are append-only and never mutated after write; everything here is
//! `Serialize + Deserialize + PartialEq` so streams round-trip losslessly.
//! Violation details carry bounded excerpts, never full content.

use bx_warden::outcome::ContentType;
use bx_warden::rule::{RuleAction, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Character budget for redacted excerpts in violation details.
pub const EXCERPT_BUDGET: usize = 120;

// ── Main telemetry stream ──────────────────────────────────────────────

/// Outcome label on authentication events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthOutcome {
    /// Credential accepted.
    Success,
    /// Credential rejected.
    Rejected,
}

/// Type-specific payload of a main-stream event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TelemetryPayload {
    /// A request entered the pipeline.
    RequestStart {
        /// Correlation id.
        request_id: Uuid,
        /// Requesting project.
        project_id: String,
        /// Requested model.
        model_id: String,
        /// SHA-256 hex of the inbound payload.
        payload_hash: String,
    },
    /// A request reached its terminal state.
    RequestComplete {
        /// Correlation id.
        request_id: Uuid,
        /// Requesting project.
        project_id: String,
        /// Whether the invocation succeeded end to end.
        success: bool,
        /// Model actually used, or the terminal step label on failure.
        model_used: String,
        /// Monotonic-clock delta from ingress.
        duration_ms: u64,
        /// Prompt token count when the adapter supplied it.
        #[serde(skip_serializing_if = "Option::is_none")]
        prompt_tokens: Option<u64>,
        /// Completion token count when the adapter supplied it.
        #[serde(skip_serializing_if = "Option::is_none")]
        completion_tokens: Option<u64>,
        /// Total token count when the adapter supplied it.
        #[serde(skip_serializing_if = "Option::is_none")]
        total_tokens: Option<u64>,
        /// Cost estimate in USD.
        #[serde(skip_serializing_if = "Option::is_none")]
        cost_usd: Option<f64>,
        /// Whether any guardrail fired during the request.
        guardrails_triggered: bool,
    },
    /// An error-taxonomy event.
    Error {
        /// Correlation id when the failure is request-scoped.
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
        /// Project when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        project_id: Option<String>,
        /// Taxonomy bucket label.
        category: String,
        /// Stable machine-readable code.
        code: String,
    },
    /// Token issuance or verification outcome.
    Authentication {
        /// Project the credential targeted.
        project_id: String,
        /// Accepted or rejected.
        outcome: AuthOutcome,
        /// Rejection reason category; never the credential.
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// One record of the main telemetry stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Unique event id.
    pub event_id: Uuid,
    /// UTC timestamp, ISO-8601 on the wire.
    pub timestamp: DateTime<Utc>,
    /// Type-specific payload, tagged by `event_type`.
    #[serde(flatten)]
    pub payload: TelemetryPayload,
}

impl TelemetryEvent {
    /// Wrap a payload with a fresh id and the current time.
    #[must_use]
    pub fn now(payload: TelemetryPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ── Guardrail stream ───────────────────────────────────────────────────

/// One rule trigger, as persisted to the guardrail stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailEvent {
    /// Unique event id.
    pub event_id: Uuid,
    /// UTC timestamp.
    pub timestamp: DateTime<Utc>,
    /// Correlation id.
    pub request_id: Uuid,
    /// Requesting project.
    pub project_id: String,
    /// Rule that fired.
    pub rule_id: String,
    /// The rule's action.
    pub action: RuleAction,
    /// The rule's severity.
    pub severity: Severity,
    /// Prompt or response.
    pub content_type: ContentType,
    /// Redacted excerpt and matched terms; never raw content beyond the
    /// excerpt budget.
    pub violation_details: ViolationDetails,
}

/// Bounded description of what matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationDetails {
    /// Keyword terms that matched.
    pub matched_keywords: Vec<String>,
    /// Named patterns that matched.
    pub matched_patterns: Vec<String>,
    /// Excerpt of the first matched span, truncated to [`EXCERPT_BUDGET`].
    pub excerpt: String,
}

// ── Interaction stream ─────────────────────────────────────────────────

/// Pipeline stage labels recorded for forensic reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Principal verified and policy checked.
    Auth,
    /// Inbound guardrail evaluation.
    GuardIn,
    /// Provider adapter call.
    ProviderCall,
    /// Outbound guardrail evaluation.
    GuardOut,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth => write!(f, "auth"),
            Self::GuardIn => write!(f, "guard_in"),
            Self::ProviderCall => write!(f, "provider_call"),
            Self::GuardOut => write!(f, "guard_out"),
        }
    }
}

/// One entry of the bounded interaction stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionStage {
    /// Correlation id.
    pub request_id: Uuid,
    /// UTC timestamp.
    pub timestamp: DateTime<Utc>,
    /// Pipeline stage.
    pub stage: StageKind,
    /// Short human-readable summary.
    pub summary: String,
    /// Stage result label, e.g. `ok`, `blocked`, `error`.
    pub result: String,
    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl InteractionStage {
    /// Build a stage entry stamped with the current time.
    #[must_use]
    pub fn now(
        request_id: Uuid,
        stage: StageKind,
        summary: impl Into<String>,
        result: impl Into<String>,
        metadata: Option<Value>,
    ) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
            stage,
            summary: summary.into(),
            result: result.into(),
            metadata,
        }
    }
}

// ── Excerpt helper ─────────────────────────────────────────────────────

/// Truncate to `max` characters on a char boundary, appending an ellipsis
/// when anything was cut.
#[must_use]
pub fn excerpt(content: &str, max: usize) -> String {
    if content.chars().count() <= max {
        content.to_string()
    } else {
        let mut out: String = content.chars().take(max).collect();
        out.push('…');
        out
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_event_round_trips_identically() {
        let event = TelemetryEvent::now(TelemetryPayload::RequestComplete {
            request_id: Uuid::new_v4(),
            project_id: "proj_real_001".into(),
            success: true,
            model_used: "gpt-4.1-nano".into(),
            duration_ms: 412,
            prompt_tokens: Some(18),
            completion_tokens: Some(64),
            total_tokens: Some(82),
            cost_usd: Some(0.000123),
            guardrails_triggered: false,
        });
        let json = serde_json::to_string(&event).unwrap();
        let back: TelemetryEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn event_type_tag_is_snake_case() {
        let event = TelemetryEvent::now(TelemetryPayload::RequestStart {
            request_id: Uuid::new_v4(),
            project_id: "p".into(),
            model_id: "m".into(),
            payload_hash: "00".into(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], "request_start");
        assert!(value["event_id"].is_string());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn authentication_event_never_requires_reason() {
        let event = TelemetryEvent::now(TelemetryPayload::Authentication {
            project_id: "p".into(),
            outcome: AuthOutcome::Success,
            reason: None,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("reason").is_none());
    }

    #[test]
    fn excerpt_respects_budget() {
        let long = "x".repeat(500);
        let cut = excerpt(&long, EXCERPT_BUDGET);
        assert_eq!(cut.chars().count(), EXCERPT_BUDGET + 1);
        assert!(cut.ends_with('…'));
        assert_eq!(excerpt("short", EXCERPT_BUDGET), "short");
    }
}
