//! Application assembly.
//!
//! [`AppState`] wires the stores, auth service, guardrail service,
//! orchestrator, telemetry writer, and rate limiter together. Construction
//! is fail-fast: any store that does not validate refuses start.

use std::sync::Arc;

use thiserror::Error;

use crate::auth::AuthService;
use crate::config::Settings;
use crate::guardrails::GuardrailService;
use crate::http::middleware::RateLimiter;
use crate::orchestrator::Orchestrator;
use crate::provider::{OpenAiCompatAdapter, ProviderAdapter, ProviderError};
use crate::stores::{ModelCatalog, ProjectStore, StoreError};
use crate::telemetry::{TelemetryError, TelemetryWriter};
use bx_warden::store::{RuleStore, RuleStoreError};

/// Startup failures; all fatal.
#[derive(Debug, Error)]
pub enum BootError {
    /// A JSON store failed to load or validate.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The guardrail rule file failed to load or compile.
    #[error(transparent)]
    Rules(#[from] RuleStoreError),

    /// The telemetry layout could not be created.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The provider adapter could not be built.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Shared per-process state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration.
    pub settings: Arc<Settings>,
    /// Token issuance/verification.
    pub auth: Arc<AuthService>,
    /// Project records.
    pub projects: Arc<ProjectStore>,
    /// Model catalog.
    pub models: Arc<ModelCatalog>,
    /// Guardrail rule store.
    pub rules: Arc<RuleStore>,
    /// Guardrail evaluation + audit emission.
    pub guardrails: Arc<GuardrailService>,
    /// The three audit streams.
    pub telemetry: Arc<TelemetryWriter>,
    /// The invocation pipeline.
    pub orchestrator: Arc<Orchestrator>,
    /// Per-IP limits and the in-flight cap.
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Assemble the broker against the default OpenAI-compatible adapter.
    ///
    /// # Errors
    ///
    /// Returns [`BootError`] on any store, rule, telemetry, or adapter
    /// failure.
    pub fn build(settings: Settings) -> Result<Self, BootError> {
        let provider = Arc::new(OpenAiCompatAdapter::new(
            settings.provider_base_url.clone(),
            settings.provider_api_key.clone(),
            settings.provider_timeout,
        )?);
        Self::build_with_provider(settings, provider)
    }

    /// Assemble the broker with an injected provider adapter (tests use a
    /// deterministic mock here).
    ///
    /// # Errors
    ///
    /// Returns [`BootError`] on any store, rule, or telemetry failure.
    pub fn build_with_provider(
        settings: Settings,
        provider: Arc<dyn ProviderAdapter>,
    ) -> Result<Self, BootError> {
        let data_dir = &settings.data_dir;
        let projects = Arc::new(ProjectStore::load(data_dir.join("projects.json"))?);
        let models = Arc::new(ModelCatalog::load(data_dir.join("llm_models.json"))?);
        let rules = Arc::new(RuleStore::load(data_dir.join("guardrails.json"))?);
        let telemetry = Arc::new(TelemetryWriter::open(data_dir, settings.interaction_cap)?);

        let auth = Arc::new(AuthService::new(
            settings.master_secret.clone(),
            settings.jwt_expire_minutes,
            projects.clone(),
            telemetry.clone(),
        ));
        let guardrails = Arc::new(GuardrailService::new(rules.clone(), telemetry.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            projects.clone(),
            models.clone(),
            guardrails.clone(),
            provider,
            telemetry.clone(),
            settings.provider_timeout,
        ));
        let limiter = Arc::new(RateLimiter::new(
            settings.rate_limit_rpm,
            settings.rate_limit_rph,
            settings.max_concurrent,
        ));

        Ok(Self {
            settings: Arc::new(settings),
            auth,
            projects,
            models,
            rules,
            guardrails,
            telemetry,
            orchestrator,
            limiter,
        })
    }
}
