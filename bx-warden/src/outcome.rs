//! Evaluation outcomes: what the engine decided and why.
//!
//! [`GuardrailResult`] is the serializable verdict consumed by the broker's
//! response composition; [`Evaluation`] additionally carries the per-rule
//! [`RuleTrigger`]s and any [`EngineFault`]s so the caller can emit one audit
//! event per trigger without the engine doing I/O itself.

use serde::{Deserialize, Serialize};

use crate::rule::{RuleAction, Severity};

// ── ContentType ────────────────────────────────────────────────────────

/// Which side of the provider call a piece of content belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Inbound content, evaluated before the provider call.
    Prompt,
    /// Outbound content, evaluated after the provider call.
    Response,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prompt => write!(f, "prompt"),
            Self::Response => write!(f, "response"),
        }
    }
}

// ── RuleTrigger ────────────────────────────────────────────────────────

/// One rule that fired during an evaluation, in rule-set order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTrigger {
    /// Which rule fired.
    pub rule_id: String,
    /// The rule's severity.
    pub severity: Severity,
    /// The rule's action.
    pub action: RuleAction,
    /// Keyword terms that were found in the content.
    pub matched_keywords: Vec<String>,
    /// Names of regex patterns that matched.
    pub matched_patterns: Vec<String>,
    /// Bounded excerpt of the first matched span, for audit trails.
    pub excerpt: String,
}

// ── EngineFault ────────────────────────────────────────────────────────

/// An unexpected failure inside a single rule's evaluation.
///
/// Faults are fail-closed: any fault forces the evaluation's dominant action
/// to [`RuleAction::Block`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineFault {
    /// Rule whose evaluation failed.
    pub rule_id: String,
    /// Short description of the failure.
    pub detail: String,
}

// ── GuardrailResult ────────────────────────────────────────────────────

/// Context recorded alongside every result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Whether a prompt or a response was evaluated.
    pub content_type: ContentType,
    /// Project the evaluation ran for.
    pub project_id: String,
    /// Number of enabled rules consulted.
    pub total_rules_checked: usize,
}

/// The aggregated verdict for one piece of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailResult {
    /// `false` exactly when the dominant action is `block`.
    pub allowed: bool,
    /// Ids of every rule that fired, in rule-set order.
    pub triggered_rules: Vec<String>,
    /// Dominant action under `block > sanitize > flag > allow`.
    pub action: RuleAction,
    /// Maximum severity across triggers, absent when nothing fired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Redacted content, present only when the dominant action is `sanitize`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanitized_content: Option<String>,
    /// Short human-readable summary of the verdict.
    pub reason: String,
    /// Evaluation context.
    pub metadata: ResultMetadata,
}

impl GuardrailResult {
    /// Returns `true` if any rule fired.
    #[must_use]
    pub fn triggered(&self) -> bool {
        !self.triggered_rules.is_empty()
    }
}

// ── Evaluation ─────────────────────────────────────────────────────────

/// Full evaluation output: the verdict plus the trigger detail the broker
/// needs to emit per-rule guardrail events.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// The aggregated verdict.
    pub result: GuardrailResult,
    /// Per-rule trigger detail, same order as `result.triggered_rules`.
    pub triggers: Vec<RuleTrigger>,
    /// Faults encountered while evaluating individual rules.
    pub faults: Vec<EngineFault>,
}

// ── Tests ──────────────────────────────────────────────────────────────
