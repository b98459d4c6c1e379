//! Compiled rule sets.
//!
//! Compilation happens once per load or per request composition, never during
//! matching. Each rule compiles to a combined alternation regex for the cheap
//! "did anything match" pass plus individual per-pattern regexes used to
//! record which named patterns fired — the two-pass shape keeps steady-state
//! evaluation O(content) for the common no-match case.

use regex::Regex;
use rustc_hash::FxHashSet;

use crate::rule::{GuardrailRule, RuleError};

// ── CompiledRule ───────────────────────────────────────────────────────

/// A single rule with its matchers pre-compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// The source rule.
    pub rule: GuardrailRule,
    /// Effective keyword terms, case-folded: configured keywords plus the
    /// names of configured patterns, deduplicated.
    pub keyword_terms: Vec<String>,
    /// Whitelist entries, case-folded.
    pub whitelist_terms: Vec<String>,
    /// Alternation of every named pattern, `(p1)|(p2)|…`; `None` when the
    /// rule has no patterns.
    pub combined: Option<Regex>,
    /// `(name, regex)` per named pattern, in a stable order.
    pub patterns: Vec<(String, Regex)>,
}

impl CompiledRule {
    fn compile(rule: GuardrailRule) -> Result<Self, RuleError> {
        rule.validate()?;

        let mut seen = FxHashSet::default();
        let mut keyword_terms = Vec::new();
        for term in rule.keywords.iter().chain(rule.patterns.keys()) {
            let folded = term.to_lowercase();
            if !folded.is_empty() && seen.insert(folded.clone()) {
                keyword_terms.push(folded);
            }
        }

        let whitelist_terms = rule
            .whitelist
            .iter()
            .map(|w| w.to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        // Stable pattern order keeps triggered_rules output deterministic.
        let mut names: Vec<&String> = rule.patterns.keys().collect();
        names.sort();

        let mut patterns = Vec::with_capacity(names.len());
        for name in &names {
            let source = &rule.patterns[*name];
            let re = Regex::new(source).map_err(|source| RuleError::InvalidRegex {
                rule_id: rule.rule_id.clone(),
                pattern: (*name).clone(),
                source,
            })?;
            patterns.push(((*name).clone(), re));
        }

        let combined = if names.is_empty() {
            None
        } else {
            let alternation = names
                .iter()
                .map(|n| format!("({})", rule.patterns[*n]))
                .collect::<Vec<_>>()
                .join("|");
            Some(
                Regex::new(&alternation).map_err(|source| RuleError::InvalidRegex {
                    rule_id: rule.rule_id.clone(),
                    pattern: "<combined>".into(),
                    source,
                })?,
            )
        };

        Ok(Self {
            rule,
            keyword_terms,
            whitelist_terms,
            combined,
            patterns,
        })
    }
}

// ── CompiledRuleSet ────────────────────────────────────────────────────

/// An immutable, fully-compiled set of rules.
///
/// Request handlers capture an `Arc<CompiledRuleSet>` on entry; the store
/// swaps the pointer on reload so in-flight evaluations keep the set they
/// started with.
#[derive(Debug, Clone, Default)]
pub struct CompiledRuleSet {
    rules: Vec<CompiledRule>,
}

impl CompiledRuleSet {
    /// Compile a set from source rules.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] on a duplicate `rule_id` or any per-rule
    /// validation failure. Disabled rules are validated too — a broken rule
    /// must not hide behind `enabled: false`.
    pub fn compile(rules: Vec<GuardrailRule>) -> Result<Self, RuleError> {
        let mut ids = FxHashSet::default();
        for rule in &rules {
            if !ids.insert(rule.rule_id.clone()) {
                return Err(RuleError::DuplicateRuleId {
                    rule_id: rule.rule_id.clone(),
                });
            }
        }
        let rules = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Compile a new set consisting of this set's rules plus `additional`
    /// ones — the transient per-request composition used for caller-provided
    /// custom guardrails. `self` is not modified.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] if an additional rule is invalid or collides
    /// with an existing `rule_id`.
    pub fn with_additional(&self, additional: Vec<GuardrailRule>) -> Result<Self, RuleError> {
        let mut ids: FxHashSet<String> = self
            .rules
            .iter()
            .map(|c| c.rule.rule_id.clone())
            .collect();
        let mut rules = self.rules.clone();
        for rule in additional {
            if !ids.insert(rule.rule_id.clone()) {
                return Err(RuleError::DuplicateRuleId {
                    rule_id: rule.rule_id,
                });
            }
            rules.push(CompiledRule::compile(rule)?);
        }
        Ok(Self { rules })
    }

    /// All compiled rules, in load order.
    #[must_use]
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Number of rules, enabled or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// `true` when the set holds no rules at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of enabled rules — the count an evaluation will consult.
    #[must_use]
    pub fn enabled_count(&self) -> usize {
        self.rules.iter().filter(|c| c.rule.enabled).count()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
