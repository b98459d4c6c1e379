//! Guardrail rule model and load-time validation.
//!
//! A [`GuardrailRule`] is a deterministic policy unit: named regex patterns,
//! a keyword set, a whitelist of suppressing substrings, a severity, and an
//! action. Rules are validated when a rule set is loaded — every regex must
//! compile, and a `sanitize` rule must have something it can actually match —
//! so that request handling never encounters a half-usable rule.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Severity ───────────────────────────────────────────────────────────

/// Severity attached to a rule and reported on its triggers.
///
/// Ordered from lowest to highest — `Ord` is derived so aggregation can take
/// `max()` over a request's triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Low risk — informational.
    Low,
    /// Medium risk — warrants review.
    Medium,
    /// High risk — should block in most policies.
    High,
    /// Critical — immediate block and incident trigger.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

// ── RuleAction ─────────────────────────────────────────────────────────

/// What happens to content when a rule triggers.
///
/// Variant order encodes dominance: `Ord` is derived so that the terminal
/// action for a request is simply the maximum over its triggers —
/// `block > sanitize > flag > allow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Let the content through unchanged.
    Allow,
    /// Let the content through but record the trigger.
    Flag,
    /// Replace every matched span with a redaction marker.
    Sanitize,
    /// Refuse the content entirely.
    Block,
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Flag => write!(f, "flag"),
            Self::Sanitize => write!(f, "sanitize"),
            Self::Block => write!(f, "block"),
        }
    }
}

// ── RuleCategory ───────────────────────────────────────────────────────

/// High-level classification of a rule, used for reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Harmful or abusive content.
    ContentSafety,
    /// Organisation-specific policy (competitors, codenames, ...).
    Business,
    /// Regulatory obligations (PII, payment data, ...).
    Compliance,
    /// Anything else.
    Other,
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContentSafety => write!(f, "content_safety"),
            Self::Business => write!(f, "business"),
            Self::Compliance => write!(f, "compliance"),
            Self::Other => write!(f, "other"),
        }
    }
}

// ── GuardrailRule ──────────────────────────────────────────────────────

/// A single guardrail rule as loaded from `guardrails.json` or supplied by a
/// caller as a custom rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailRule {
    /// Unique identifier within a rule set.
    pub rule_id: String,
    /// Reporting category.
    #[serde(default = "default_category")]
    pub category: RuleCategory,
    /// Severity reported when the rule triggers.
    #[serde(default = "default_severity")]
    pub severity: Severity,
    /// Action taken when the rule triggers.
    #[serde(default = "default_action")]
    pub action: RuleAction,
    /// Named regex patterns; the name doubles as a keyword term.
    #[serde(default)]
    pub patterns: FxHashMap<String, String>,
    /// Keyword terms matched by case-folded substring containment.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Substrings whose presence anywhere in the content suppresses this
    /// rule entirely. Rule-local.
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Disabled rules are validated at load but never evaluated.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_category() -> RuleCategory {
    RuleCategory::Other
}

fn default_severity() -> Severity {
    Severity::Medium
}

fn default_action() -> RuleAction {
    RuleAction::Flag
}

fn default_enabled() -> bool {
    true
}

impl GuardrailRule {
    /// Validate the rule without compiling a full set.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] if the id is empty, any regex fails to compile,
    /// or the rule is `sanitize` with nothing it could match.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.rule_id.trim().is_empty() {
            return Err(RuleError::EmptyRuleId);
        }
        for (name, pattern) in &self.patterns {
            regex::Regex::new(pattern).map_err(|source| RuleError::InvalidRegex {
                rule_id: self.rule_id.clone(),
                pattern: name.clone(),
                source,
            })?;
        }
        if self.action == RuleAction::Sanitize && self.patterns.is_empty() && self.keywords.is_empty()
        {
            return Err(RuleError::UnmatchableSanitize {
                rule_id: self.rule_id.clone(),
            });
        }
        Ok(())
    }
}

// ── RuleError ──────────────────────────────────────────────────────────

/// Validation failures raised when loading or composing rules.
#[derive(Debug, Error)]
pub enum RuleError {
    /// A rule has a blank `rule_id`.
    #[error("rule has an empty rule_id")]
    EmptyRuleId,

    /// Two rules in one set share a `rule_id`.
    #[error("duplicate rule_id '{rule_id}'")]
    DuplicateRuleId {
        /// The offending id.
        rule_id: String,
    },

    /// A named pattern failed to compile.
    #[error("rule '{rule_id}' pattern '{pattern}' is not a valid regex: {source}")]
    InvalidRegex {
        /// Rule the pattern belongs to.
        rule_id: String,
        /// Pattern name within the rule.
        pattern: String,
        /// Underlying regex error.
        source: regex::Error,
    },

    /// A `sanitize` rule with no keywords and no patterns can never produce
    /// sanitized output.
    #[error("rule '{rule_id}' has action=sanitize but no keywords or patterns")]
    UnmatchableSanitize {
        /// The offending id.
        rule_id: String,
    },
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str) -> GuardrailRule {
        GuardrailRule {
            rule_id: id.into(),
            category: RuleCategory::Other,
            severity: Severity::Medium,
            action: RuleAction::Flag,
            patterns: FxHashMap::default(),
            keywords: vec!["secret".into()],
            whitelist: vec![],
            enabled: true,
        }
    }

    #[test]
    fn action_dominance_order() {
        assert!(RuleAction::Allow < RuleAction::Flag);
        assert!(RuleAction::Flag < RuleAction::Sanitize);
        assert!(RuleAction::Sanitize < RuleAction::Block);
    }

    #[test]
    fn severity_order_and_display() {
        assert!(Severity::Low < Severity::Critical);
        assert_eq!(Severity::High.to_string(), "high");
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&RuleAction::Sanitize).unwrap();
        assert_eq!(json, r#""sanitize""#);
        let parsed: Severity = serde_json::from_str(r#""critical""#).unwrap();
        assert_eq!(parsed, Severity::Critical);
    }

    #[test]
    fn invalid_regex_rejected() {
        let mut r = rule("bad");
        r.patterns.insert("p".into(), "(".into());
        let err = r.validate().unwrap_err();
        assert!(matches!(err, RuleError::InvalidRegex { .. }));
    }

    #[test]
    fn sanitize_without_matchables_rejected() {
        let mut r = rule("s");
        r.action = RuleAction::Sanitize;
        r.keywords.clear();
        let err = r.validate().unwrap_err();
        assert!(matches!(err, RuleError::UnmatchableSanitize { .. }));
    }

    #[test]
    fn minimal_rule_deserializes_with_defaults() {
        let r: GuardrailRule =
            serde_json::from_str(r#"{"rule_id": "k", "keywords": ["x"]}"#).unwrap();
        assert!(r.enabled);
        assert_eq!(r.action, RuleAction::Flag);
        assert_eq!(r.severity, Severity::Medium);
    }
}
