//! End-to-end evaluation behavior over realistic rule sets.

use bx_warden::prelude::*;
use proptest::prelude::*;
use rustc_hash::FxHashMap;

fn rule(
    id: &str,
    action: RuleAction,
    severity: Severity,
    keywords: &[&str],
    patterns: &[(&str, &str)],
    whitelist: &[&str],
) -> GuardrailRule {
    GuardrailRule {
        rule_id: id.into(),
        category: RuleCategory::Other,
        severity,
        action,
        patterns: patterns
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<FxHashMap<_, _>>(),
        keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        whitelist: whitelist.iter().map(|w| (*w).to_string()).collect(),
        enabled: true,
    }
}

fn engine(rules: Vec<GuardrailRule>) -> GuardEngine {
    GuardEngine::new(CompiledRuleSet::compile(rules).unwrap())
}

#[test]
fn two_phase_rule_set_evaluates_prompt_and_response_identically() {
    let rules = vec![rule(
        "no_python",
        RuleAction::Block,
        Severity::High,
        &[],
        &[("src", r"(?i)python|def |import ")],
        &[],
    )];
    let e = engine(rules);

    let prompt = e.evaluate(
        "Write python code to sort a list",
        ContentType::Prompt,
        "proj_real_001",
    );
    assert!(!prompt.result.allowed);
    assert_eq!(prompt.result.triggered_rules, vec!["no_python"]);
    assert_eq!(prompt.result.metadata.content_type, ContentType::Prompt);

    let response = e.evaluate(
        "here you go: import sys",
        ContentType::Response,
        "proj_real_001",
    );
    assert!(!response.result.allowed);
    assert_eq!(response.result.metadata.content_type, ContentType::Response);
}

#[test]
fn whitelist_hit_anywhere_in_content_skips_only_that_rule() {
    let rules = vec![
        rule(
            "strict",
            RuleAction::Block,
            Severity::High,
            &["merger"],
            &[],
            &["public filing"],
        ),
        rule(
            "loose",
            RuleAction::Flag,
            Severity::Low,
            &["merger"],
            &[],
            &[],
        ),
    ];
    let eval = engine(rules).evaluate(
        "per the PUBLIC FILING, the merger closed",
        ContentType::Prompt,
        "p",
    );
    assert!(eval.result.allowed);
    assert_eq!(eval.result.triggered_rules, vec!["loose"]);
    assert_eq!(eval.result.action, RuleAction::Flag);
}

#[test]
fn dominant_action_and_max_severity_aggregate_across_rules() {
    let rules = vec![
        rule("f", RuleAction::Flag, Severity::Critical, &["one"], &[], &[]),
        rule(
            "s",
            RuleAction::Sanitize,
            Severity::Low,
            &["two"],
            &[],
            &[],
        ),
    ];
    let eval = engine(rules).evaluate("one two", ContentType::Prompt, "p");
    assert!(eval.result.allowed);
    assert_eq!(eval.result.action, RuleAction::Sanitize);
    assert_eq!(eval.result.severity, Some(Severity::Critical));
}

#[test]
fn sanitized_output_contains_no_triggered_keyword_or_regex_hit() {
    let rules = vec![rule(
        "scrub",
        RuleAction::Sanitize,
        Severity::High,
        &["SessionToken"],
        &[("hex32", r"[0-9a-f]{32}")],
        &[],
    )];
    let content = "sessiontoken 0123456789abcdef0123456789abcdef stays private";
    let eval = engine(rules).evaluate(content, ContentType::Response, "p");
    let sanitized = eval.result.sanitized_content.unwrap();
    assert!(!sanitized.to_lowercase().contains("sessiontoken"));
    assert!(!sanitized.contains("0123456789abcdef0123456789abcdef"));
    assert!(sanitized.contains("stays private"));
}

#[test]
fn evaluation_is_deterministic() {
    let make = || {
        engine(vec![
            rule("a", RuleAction::Flag, Severity::Low, &["x"], &[], &[]),
            rule("b", RuleAction::Block, Severity::High, &[], &[("p", "y+")], &[]),
        ])
    };
    let left = make().evaluate("x yyy", ContentType::Prompt, "p");
    let right = make().evaluate("x yyy", ContentType::Prompt, "p");
    assert_eq!(left.result.triggered_rules, right.result.triggered_rules);
    assert_eq!(left.result.action, right.result.action);
    assert_eq!(left.result.reason, right.result.reason);
}

proptest! {
    /// The allowed flag is false exactly when the dominant action is block.
    #[test]
    fn allowed_iff_dominant_not_block(content in ".{0,120}") {
        let rules = vec![
            rule("kb", RuleAction::Block, Severity::High, &["zap"], &[], &[]),
            rule("kf", RuleAction::Flag, Severity::Low, &["zip"], &[], &[]),
        ];
        let eval = engine(rules).evaluate(&content, ContentType::Prompt, "p");
        prop_assert_eq!(eval.result.allowed, eval.result.action != RuleAction::Block);
    }

    /// Sanitized text never contains a configured keyword, case-folded.
    #[test]
    fn sanitize_removes_keyword(prefix in "[a-z ]{0,40}", suffix in "[a-z ]{0,40}") {
        let rules = vec![rule(
            "s",
            RuleAction::Sanitize,
            Severity::Medium,
            &["confidential"],
            &[],
            &[],
        )];
        let content = format!("{prefix}ConFiDential{suffix}");
        let eval = engine(rules).evaluate(&content, ContentType::Prompt, "p");
        if let Some(sanitized) = eval.result.sanitized_content {
            prop_assert!(!sanitized.to_lowercase().contains("confidential"));
        }
    }
}
