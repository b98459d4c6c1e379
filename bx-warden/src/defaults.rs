//! Built-in rule library.
//!
//! [`builtin_rules`] is the policy a fresh deployment starts from when no
//! `guardrails.json` exists yet. Operators are expected to edit the seeded
//! file; these defaults aim for safe-but-unsurprising coverage across the
//! four rule categories.

use rustc_hash::FxHashMap;

use crate::rule::{GuardrailRule, RuleAction, RuleCategory, Severity};

fn rule(
    rule_id: &str,
    category: RuleCategory,
    severity: Severity,
    action: RuleAction,
    patterns: &[(&str, &str)],
    keywords: &[&str],
    whitelist: &[&str],
) -> GuardrailRule {
    GuardrailRule {
        rule_id: rule_id.to_string(),
        category,
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

/// The default rule set seeded into a fresh `guardrails.json`.
#[must_use]
pub fn builtin_rules() -> Vec<GuardrailRule> {
    use RuleAction::{Block, Flag, Sanitize};
    use RuleCategory::{Business, Compliance, ContentSafety, Other};
    use Severity::{Critical, High, Low, Medium};

    vec![
        // ── Content safety ─────────────────────────────────────────
        rule(
            "cs_prompt_injection",
            ContentSafety,
            Critical,
            Block,
            &[
                ("ignore_instructions", r"(?i)ignore\s+(all\s+)?previous\s+instructions"),
                ("role_override", r"(?i)you\s+are\s+now\b|(?i)pretend\s+(to\s+be|you\s+are)\b"),
                ("system_extraction", r"(?i)(print|show|repeat)\s+(the|your)\s+(system\s+)?(prompt|instructions)"),
            ],
            &[],
            &[],
        ),
        rule(
            "cs_violence_incitement",
            ContentSafety,
            High,
            Block,
            &[("weapon_instructions", r"(?i)how\s+to\s+(build|make)\s+(a\s+)?(bomb|weapon|explosive)")],
            &[],
            &["fictional scenario"],
        ),
        rule(
            "cs_self_harm",
            ContentSafety,
            Critical,
            Block,
            &[],
            &["kill myself", "end my life"],
            &["prevention hotline"],
        ),
        // ── Compliance ─────────────────────────────────────────────
        rule(
            "comp_pii_contact",
            Compliance,
            High,
            Sanitize,
            &[
                ("email", r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
                ("phone_br", r"\+?55\s?\(?\d{2}\)?\s?9?\d{4}-?\d{4}"),
            ],
            &[],
            &[],
        ),
        rule(
            "comp_document_numbers",
            Compliance,
            Critical,
            Sanitize,
            &[
                ("cpf", r"\d{3}\.\d{3}\.\d{3}-\d{2}"),
                ("credit_card", r"\b(?:\d[ -]?){13,16}\b"),
            ],
            &[],
            &[],
        ),
        rule(
            "comp_credentials",
            Compliance,
            Critical,
            Sanitize,
            &[
                ("bearer_header", r"(?i)bearer\s+[a-z0-9._-]{16,}"),
                ("secret_assignment", r#"(?i)(api[_-]?key|secret|password)\s*[:=]\s*\S{8,}"#),
            ],
            &[],
            &[],
        ),
        // ── Business ───────────────────────────────────────────────
        rule(
            "biz_internal_codenames",
            Business,
            Medium,
            Flag,
            &[],
            &["project aurora", "project helix"],
            &["press release"],
        ),
        rule(
            "biz_financial_guidance",
            Business,
            Medium,
            Flag,
            &[("guidance", r"(?i)(revenue|earnings)\s+(forecast|guidance)")],
            &[],
            &[],
        ),
        // ── Other ──────────────────────────────────────────────────
        rule(
            "other_excessive_repetition",
            Other,
            Low,
            Flag,
            &[("punctuation_run", r"[!.\-=~#*]{40,}")],
            &[],
            &[],
        ),
    ]
}

// ── Tests ──────────────────────────────────────────────────────────────
