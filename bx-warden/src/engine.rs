//! The evaluation pass.
//!
//! [`GuardEngine`] holds an immutable snapshot of a [`CompiledRuleSet`] and
//! evaluates content against it. Per rule, the order is fixed: whitelist
//! suppression, keyword containment, regex containment. Matching is
//! side-effect-free; the engine never mutates the content and never performs
//! I/O — emitting audit events from the triggers is the caller's job.
//!
//! A panic inside a single rule's evaluation is caught and converted into an
//! [`EngineFault`]; any fault forces the dominant action to `block`.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::outcome::{
    ContentType, EngineFault, Evaluation, GuardrailResult, ResultMetadata, RuleTrigger,
};
use crate::rule::RuleAction;
use crate::ruleset::{CompiledRule, CompiledRuleSet};
use crate::sanitize;

/// Upper bound on the matched-text excerpt carried by a trigger.
const EXCERPT_MAX_CHARS: usize = 80;

/// Stateless evaluator over one rule-set snapshot.
#[derive(Debug, Clone)]
pub struct GuardEngine {
    rules: Arc<CompiledRuleSet>,
}

impl GuardEngine {
    /// Build an engine over a snapshot.
    #[must_use]
    pub fn new(rules: impl Into<Arc<CompiledRuleSet>>) -> Self {
        Self {
            rules: rules.into(),
        }
    }

    /// The snapshot this engine evaluates against.
    #[must_use]
    pub fn rules(&self) -> &CompiledRuleSet {
        &self.rules
    }

    /// Evaluate `content` against every enabled rule.
    #[must_use]
    pub fn evaluate(
        &self,
        content: &str,
        content_type: ContentType,
        project_id: &str,
    ) -> Evaluation {
        let (folded, _) = sanitize::fold_with_spans(content);

        let mut triggers: Vec<RuleTrigger> = Vec::new();
        let mut faults: Vec<EngineFault> = Vec::new();

        for compiled in self.rules.rules() {
            if !compiled.rule.enabled {
                continue;
            }
            let checked = catch_unwind(AssertUnwindSafe(|| {
                check_rule(compiled, content, &folded)
            }));
            match checked {
                Ok(Some(trigger)) => triggers.push(trigger),
                Ok(None) => {}
                Err(panic) => {
                    let detail = panic_message(&panic);
                    tracing::error!(
                        rule_id = %compiled.rule.rule_id,
                        detail = %detail,
                        "rule evaluation fault, failing closed"
                    );
                    faults.push(EngineFault {
                        rule_id: compiled.rule.rule_id.clone(),
                        detail,
                    });
                }
            }
        }

        let total_rules_checked = self.rules.enabled_count();
        let severity = triggers.iter().map(|t| t.severity).max();
        let dominant = if faults.is_empty() {
            triggers
                .iter()
                .map(|t| t.action)
                .max()
                .unwrap_or(RuleAction::Allow)
        } else {
            RuleAction::Block
        };
        let allowed = dominant != RuleAction::Block;

        let sanitized_content = (dominant == RuleAction::Sanitize).then(|| {
            let fired: Vec<&CompiledRule> = self
                .rules
                .rules()
                .iter()
                .filter(|c| triggers.iter().any(|t| t.rule_id == c.rule.rule_id))
                .collect();
            sanitize::sanitize(content, fired)
        });

        let reason = if !faults.is_empty() {
            "rule evaluation fault, failing closed".to_string()
        } else {
            match dominant {
                RuleAction::Block => {
                    let blocker = triggers
                        .iter()
                        .find(|t| t.action == RuleAction::Block)
                        .map_or("<unknown>", |t| t.rule_id.as_str());
                    format!("blocked by rule '{blocker}'")
                }
                RuleAction::Sanitize => "content sanitized".to_string(),
                RuleAction::Flag => "flagged for review".to_string(),
                RuleAction::Allow if triggers.is_empty() => "no rules triggered".to_string(),
                RuleAction::Allow => "allowed with triggers".to_string(),
            }
        };

        tracing::debug!(
            %content_type,
            project_id,
            triggers = triggers.len(),
            faults = faults.len(),
            action = %dominant,
            "guardrail evaluation"
        );

        Evaluation {
            result: GuardrailResult {
                allowed,
                triggered_rules: triggers.iter().map(|t| t.rule_id.clone()).collect(),
                action: dominant,
                severity,
                sanitized_content,
                reason,
                metadata: ResultMetadata {
                    content_type,
                    project_id: project_id.to_string(),
                    total_rules_checked,
                },
            },
            triggers,
            faults,
        }
    }
}

/// Evaluate one rule. Returns a trigger when the rule fires.
fn check_rule(compiled: &CompiledRule, content: &str, folded: &str) -> Option<RuleTrigger> {
    // Whitelist suppression is rule-local and checked first.
    if compiled
        .whitelist_terms
        .iter()
        .any(|term| folded.contains(term.as_str()))
    {
        return None;
    }

    let matched_keywords: Vec<String> = compiled
        .keyword_terms
        .iter()
        .filter(|term| folded.contains(term.as_str()))
        .cloned()
        .collect();

    let mut matched_patterns = Vec::new();
    let mut excerpt = String::new();
    if let Some(combined) = &compiled.combined
        && combined.is_match(content)
    {
        for (name, re) in &compiled.patterns {
            if let Some(m) = re.find(content) {
                matched_patterns.push(name.clone());
                if excerpt.is_empty() {
                    excerpt = truncate_chars(m.as_str(), EXCERPT_MAX_CHARS);
                }
            }
        }
    }

    if matched_keywords.is_empty() && matched_patterns.is_empty() {
        return None;
    }

    if excerpt.is_empty()
        && let Some(term) = matched_keywords.first()
        && let Some(span) = sanitize::find_term_spans(content, term).into_iter().next()
    {
        excerpt = truncate_chars(&content[span], EXCERPT_MAX_CHARS);
    }

    Some(RuleTrigger {
        rule_id: compiled.rule.rule_id.clone(),
        severity: compiled.rule.severity,
        action: compiled.rule.action,
        matched_keywords,
        matched_patterns,
        excerpt,
    })
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push('…');
        out
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{GuardrailRule, RuleCategory, Severity};
    use rustc_hash::FxHashMap;

    fn rule(id: &str, action: RuleAction, severity: Severity) -> GuardrailRule {
        GuardrailRule {
            rule_id: id.into(),
            category: RuleCategory::ContentSafety,
            severity,
            action,
            patterns: FxHashMap::default(),
            keywords: vec![],
            whitelist: vec![],
            enabled: true,
        }
    }

    fn engine(rules: Vec<GuardrailRule>) -> GuardEngine {
        GuardEngine::new(CompiledRuleSet::compile(rules).unwrap())
    }

    #[test]
    fn clean_content_allows() {
        let mut r = rule("kw", RuleAction::Block, Severity::High);
        r.keywords = vec!["forbidden".into()];
        let eval = engine(vec![r]).evaluate("hello world", ContentType::Prompt, "proj");
        assert!(eval.result.allowed);
        assert_eq!(eval.result.action, RuleAction::Allow);
        assert!(eval.result.severity.is_none());
        assert_eq!(eval.result.metadata.total_rules_checked, 1);
    }

    #[test]
    fn block_wins_dominance() {
        let mut flag = rule("flag", RuleAction::Flag, Severity::Low);
        flag.keywords = vec!["alpha".into()];
        let mut block = rule("block", RuleAction::Block, Severity::High);
        block.keywords = vec!["beta".into()];
        let eval = engine(vec![flag, block]).evaluate("alpha beta", ContentType::Prompt, "proj");
        assert!(!eval.result.allowed);
        assert_eq!(eval.result.action, RuleAction::Block);
        assert_eq!(eval.result.severity, Some(Severity::High));
        assert_eq!(eval.result.triggered_rules, vec!["flag", "block"]);
    }

    #[test]
    fn allowed_iff_not_block() {
        let mut sanitize = rule("san", RuleAction::Sanitize, Severity::Medium);
        sanitize.keywords = vec!["token".into()];
        let eval = engine(vec![sanitize]).evaluate("my token here", ContentType::Prompt, "proj");
        assert!(eval.result.allowed);
        assert_eq!(eval.result.action, RuleAction::Sanitize);
        assert_eq!(
            eval.result.sanitized_content.as_deref(),
            Some("my [REDACTED] here")
        );
    }

    #[test]
    fn whitelist_suppresses_only_its_rule() {
        let mut suppressed = rule("suppressed", RuleAction::Block, Severity::High);
        suppressed.keywords = vec!["danger".into()];
        suppressed.whitelist = vec!["training example".into()];
        let mut other = rule("other", RuleAction::Flag, Severity::Low);
        other.keywords = vec!["danger".into()];
        let eval = engine(vec![suppressed, other]).evaluate(
            "a Training Example with danger",
            ContentType::Prompt,
            "proj",
        );
        assert!(eval.result.allowed);
        assert_eq!(eval.result.triggered_rules, vec!["other"]);
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let mut r = rule("kw", RuleAction::Flag, Severity::Low);
        r.keywords = vec!["Forbidden".into()];
        let eval = engine(vec![r]).evaluate("FORBIDDEN fruit", ContentType::Response, "proj");
        assert_eq!(eval.result.triggered_rules, vec!["kw"]);
        assert_eq!(eval.triggers[0].matched_keywords, vec!["forbidden"]);
    }

    #[test]
    fn pattern_names_recorded() {
        let mut r = rule("re", RuleAction::Flag, Severity::Medium);
        r.patterns.insert("digits".into(), r"\d{4}".into());
        r.patterns.insert("word".into(), "quux".into());
        let eval = engine(vec![r]).evaluate("pin 1234", ContentType::Prompt, "proj");
        assert_eq!(eval.triggers[0].matched_patterns, vec!["digits"]);
        assert_eq!(eval.triggers[0].excerpt, "1234");
    }

    #[test]
    fn disabled_rule_not_consulted() {
        let mut r = rule("off", RuleAction::Block, Severity::High);
        r.keywords = vec!["x".into()];
        r.enabled = false;
        let eval = engine(vec![r]).evaluate("x", ContentType::Prompt, "proj");
        assert!(eval.result.allowed);
        assert_eq!(eval.result.metadata.total_rules_checked, 0);
    }

    #[test]
    fn input_never_mutated() {
        let content = String::from("my token here");
        let mut r = rule("san", RuleAction::Sanitize, Severity::Medium);
        r.keywords = vec!["token".into()];
        let _ = engine(vec![r]).evaluate(&content, ContentType::Prompt, "proj");
        assert_eq!(content, "my token here");
    }
}
