//! File-backed rule store with atomic snapshot reload.
//!
//! The rule file is a single JSON array of [`GuardrailRule`]s. It is read and
//! compiled in full before the live snapshot pointer is swapped, so
//! concurrent evaluations observe either the old set or the new one — never
//! a mix. A missing file is seeded from [`defaults::builtin_rules`] with an
//! atomic write (temp file, fsync, rename).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::defaults;
use crate::rule::{GuardrailRule, RuleError};
use crate::ruleset::CompiledRuleSet;

/// Failures raised while loading or reloading the rule file.
#[derive(Debug, Error)]
pub enum RuleStoreError {
    /// The rule file could not be read or written.
    #[error("rule file {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The rule file is not a JSON array of rules.
    #[error("rule file {path} is not valid JSON: {source}")]
    Parse {
        /// Offending path.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// A rule failed validation or compilation.
    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// Loads, serves, and reloads the guardrail rule set.
///
/// Readers call [`snapshot`](Self::snapshot) and keep the returned `Arc` for
/// the lifetime of one request; [`reload`](Self::reload) swaps the pointer
/// atomically after the whole replacement set compiled.
#[derive(Debug)]
pub struct RuleStore {
    path: PathBuf,
    current: RwLock<Arc<CompiledRuleSet>>,
}

impl RuleStore {
    /// Load the store from `path`, seeding the file with the built-in rule
    /// library when it does not exist. Fails fast on any invalid rule.
    ///
    /// # Errors
    ///
    /// Returns [`RuleStoreError`] on I/O, parse, or validation failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuleStoreError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            tracing::info!(path = %path.display(), "rule file missing, seeding built-in rules");
            write_rules_atomic(&path, &defaults::builtin_rules())?;
        }
        let set = read_and_compile(&path)?;
        tracing::info!(
            path = %path.display(),
            rules = set.len(),
            enabled = set.enabled_count(),
            "loaded guardrail rules"
        );
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(set)),
        })
    }

    /// The current immutable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CompiledRuleSet> {
        self.current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Re-read and re-compile the rule file, then swap the snapshot.
    ///
    /// On failure the previous snapshot stays live.
    ///
    /// # Errors
    ///
    /// Returns [`RuleStoreError`] on I/O, parse, or validation failure.
    pub fn reload(&self) -> Result<(), RuleStoreError> {
        let set = Arc::new(read_and_compile(&self.path)?);
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = set;
        tracing::info!(path = %self.path.display(), "guardrail rules reloaded");
        Ok(())
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_and_compile(path: &Path) -> Result<CompiledRuleSet, RuleStoreError> {
    let raw = fs::read_to_string(path).map_err(|source| RuleStoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let rules: Vec<GuardrailRule> =
        serde_json::from_str(&raw).map_err(|source| RuleStoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(CompiledRuleSet::compile(rules)?)
}

/// Write rules as pretty JSON via temp-file + fsync + rename on the same
/// filesystem, so readers only ever see a complete file.
fn write_rules_atomic(path: &Path, rules: &[GuardrailRule]) -> Result<(), RuleStoreError> {
    let io_err = |source| RuleStoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(rules).map_err(|source| RuleStoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let mut file = fs::File::create(&tmp).map_err(io_err)?;
    file.write_all(&body).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::ContentType;
    use crate::prelude::GuardEngine;

    fn rules_json(rules: &serde_json::Value) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("guardrails.json"),
            serde_json::to_string_pretty(rules).unwrap(),
        )
        .unwrap();
        dir
    }

    #[test]
    fn missing_file_seeded_with_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guardrails.json");
        let store = RuleStore::load(&path).unwrap();
        assert!(path.exists());
        assert!(!store.snapshot().is_empty());
    }

    #[test]
    fn invalid_regex_fails_fast() {
        let dir = rules_json(&serde_json::json!([
            {"rule_id": "bad", "patterns": {"p": "("}}
        ]));
        let err = RuleStore::load(dir.path().join("guardrails.json")).unwrap_err();
        assert!(matches!(err, RuleStoreError::Rule(RuleError::InvalidRegex { .. })));
    }

    #[test]
    fn reload_swaps_snapshot_and_keeps_old_on_error() {
        let dir = rules_json(&serde_json::json!([
            {"rule_id": "a", "keywords": ["alpha"], "action": "block"}
        ]));
        let path = dir.path().join("guardrails.json");
        let store = RuleStore::load(&path).unwrap();

        let before = store.snapshot();
        let engine = GuardEngine::new(before.clone());

        fs::write(
            &path,
            serde_json::to_string(&serde_json::json!([
                {"rule_id": "b", "keywords": ["beta"], "action": "block"}
            ]))
            .unwrap(),
        )
        .unwrap();
        store.reload().unwrap();

        // The held snapshot still evaluates with the old rules.
        let eval = engine.evaluate("alpha", ContentType::Prompt, "p");
        assert!(!eval.result.allowed);
        // New snapshots use the replacement set.
        let eval = GuardEngine::new(store.snapshot()).evaluate("alpha", ContentType::Prompt, "p");
        assert!(eval.result.allowed);

        // A broken file leaves the last good snapshot live.
        fs::write(&path, "not json").unwrap();
        assert!(store.reload().is_err());
        let eval = GuardEngine::new(store.snapshot()).evaluate("beta", ContentType::Prompt, "p");
        assert!(!eval.result.allowed);
    }
}
