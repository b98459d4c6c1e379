//! Model catalog.
//!
//! `llm_models.json` is read once at startup and never written during a run.
//! The catalog backs the `/llm/models` listing and the per-request cost
//! estimate recorded on completion events.

use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::fsio;
use super::StoreError;

/// One entry of the model catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Identifier used in invocation requests and allow-lists.
    pub model_id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Upstream provider label.
    pub provider: String,
    /// USD per 1k prompt tokens.
    pub input_cost_per_1k: f64,
    /// USD per 1k completion tokens.
    pub output_cost_per_1k: f64,
    /// Provider-side context limit.
    pub max_tokens: u32,
}

/// Read-only catalog of known models.
pub struct ModelCatalog {
    models: FxHashMap<String, ModelInfo>,
}

impl ModelCatalog {
    /// Load the catalog; a missing file yields an empty catalog (projects
    /// can still invoke, cost estimates are simply absent).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on unparseable contents or duplicate ids.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "model catalog missing, starting empty");
            return Ok(Self {
                models: FxHashMap::default(),
            });
        }
        let records: Vec<ModelInfo> = fsio::read_json(path)?;
        let mut models = FxHashMap::default();
        for record in records {
            if models.insert(record.model_id.clone(), record).is_some() {
                return Err(StoreError::Integrity {
                    message: "duplicate model_id in catalog".into(),
                });
            }
        }
        tracing::info!(path = %path.display(), models = models.len(), "loaded model catalog");
        Ok(Self { models })
    }

    /// Look up one model.
    #[must_use]
    pub fn get(&self, model_id: &str) -> Option<&ModelInfo> {
        self.models.get(model_id)
    }

    /// Catalog entries for the given allow-list, in allow-list order.
    /// Allowed models missing from the catalog are skipped.
    #[must_use]
    pub fn for_allow_list(&self, allowed: &[String]) -> Vec<ModelInfo> {
        allowed
            .iter()
            .filter_map(|id| self.models.get(id).cloned())
            .collect()
    }

    /// USD cost estimate for a completed call, `None` when the model is not
    /// in the catalog.
    #[must_use]
    pub fn estimate_cost(
        &self,
        model_id: &str,
        prompt_tokens: u64,
        completion_tokens: u64,
    ) -> Option<f64> {
        let info = self.models.get(model_id)?;
        let cost = (prompt_tokens as f64 / 1_000.0) * info.input_cost_per_1k
            + (completion_tokens as f64 / 1_000.0) * info.output_cost_per_1k;
        Some((cost * 1_000_000.0).round() / 1_000_000.0)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ModelCatalog {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("llm_models.json");
        fsio::write_json_atomic(
            &path,
            &serde_json::json!([
                {
                    "model_id": "gpt-4.1-nano",
                    "display_name": "GPT-4.1 nano",
                    "provider": "openai",
                    "input_cost_per_1k": 0.1,
                    "output_cost_per_1k": 0.4,
                    "max_tokens": 128000
                }
            ]),
        )
        .unwrap();
        ModelCatalog::load(path).unwrap()
    }

    #[test]
    fn lookup_and_allow_list_filter() {
        let catalog = catalog();
        assert!(catalog.get("gpt-4.1-nano").is_some());
        let listed = catalog.for_allow_list(&["gpt-4.1-nano".into(), "gpt-9".into()]);
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn cost_estimate() {
        let catalog = catalog();
        let cost = catalog.estimate_cost("gpt-4.1-nano", 1000, 500).unwrap();
        assert!((cost - 0.3).abs() < 1e-9);
        assert!(catalog.estimate_cost("gpt-9", 1, 1).is_none());
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ModelCatalog::load(dir.path().join("absent.json")).unwrap();
        assert!(catalog.get("anything").is_none());
    }
}
