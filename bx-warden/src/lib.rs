//! ```text
//! guardrails.json ──► RuleStore ──► Arc<CompiledRuleSet> (atomic snapshot)
//!                                     │
//!                                     ├─► GuardEngine::evaluate(prompt)   ── guard-in
//!                                     │        │
//!                                     │        ├─► whitelist suppression (rule-local)
//!                                     │        ├─► keyword containment (case-folded)
//!                                     │        ├─► regex alternation containment
//!                                     │        └─► trigger aggregation ──► GuardrailResult
//!                                     │
//!                                     └─► GuardEngine::evaluate(response) ── guard-out
//! ```
//!
//! # bx-warden
//!
//! **Deterministic guardrail engine for the bradax governance broker.**
//!
//! `bx-warden` evaluates a piece of content — a prompt on the way into an LLM
//! provider, a response on the way out — against a compiled set of
//! [`GuardrailRule`](rule::GuardrailRule)s and returns a
//! [`GuardrailResult`](outcome::GuardrailResult) describing what must happen
//! to it. Evaluation is strictly deterministic: no model calls, no clock
//! reads, no shared mutable state. The same content against the same rule set
//! always yields the same result.
//!
//! ## Key properties
//!
//! - **Two-pass matching** – a combined alternation regex answers "did this
//!   rule fire" cheaply; per-pattern regexes are consulted only on a hit to
//!   record which named patterns matched.
//! - **Rule-local whitelists** – a whitelist substring suppresses its own
//!   rule and nothing else.
//! - **Dominance aggregation** – the terminal action is the maximum over all
//!   triggers under `block > sanitize > flag > allow`.
//! - **Fail-closed faults** – a panic inside any single rule's evaluation is
//!   caught, reported, and forces the dominant action to `block`.
//! - **Atomic snapshots** – [`RuleStore`](store::RuleStore) swaps a whole
//!   compiled set at once; concurrent evaluations never observe a mix of old
//!   and new rules.
//!
//! ## Modules
//!
//! - [`rule`] – rule model, severities, actions, load-time validation
//! - [`ruleset`] – compiled rule sets and per-request composition
//! - [`engine`] – the evaluation pass itself
//! - [`sanitize`] – case-folded redaction of matched spans
//! - [`outcome`] – results, triggers, and engine faults
//! - [`store`] – file-backed rule store with atomic snapshot reload
//! - [`defaults`] – built-in rule library used to seed a fresh deployment

pub mod defaults;
pub mod engine;
pub mod outcome;
pub mod rule;
pub mod ruleset;
pub mod sanitize;
pub mod store;

/// Re-exports for convenient access to core types
pub mod prelude {
    pub use crate::engine::GuardEngine;
    pub use crate::outcome::{ContentType, Evaluation, GuardrailResult, RuleTrigger};
    pub use crate::rule::{GuardrailRule, RuleAction, RuleCategory, RuleError, Severity};
    pub use crate::ruleset::CompiledRuleSet;
    pub use crate::store::{RuleStore, RuleStoreError};
}
