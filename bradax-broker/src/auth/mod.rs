//! Token issuance and verification.
//!
//! Tokens are HS256 JWTs signed with a per-project secret derived on demand
//! from the master secret (see [`derive`]). The `kid` header pins the
//! project and derivation version, so verification re-derives the exact key
//! the token was issued under — a token issued for project A can never
//! verify against project B.
//!
//! Every rejection is recorded as an `authentication` telemetry event with a
//! reason category; token and secret material never reach the logs.

pub mod api_key;
pub mod derive;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::BrokerError;
use crate::stores::{ProjectStatus, ProjectStore};
use crate::telemetry::{AuthOutcome, TelemetryEvent, TelemetryPayload, TelemetryWriter};

use derive::{KID_VERSION, Kid, derive_project_secret};

/// Capability tags embedded in every issued token.
pub const DEFAULT_SCOPES: &[&str] = &["invoke", "models:read", "telemetry:write"];

// ── AuthError ──────────────────────────────────────────────────────────

/// Credential rejections, each mapped to a stable reason category.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Project absent from the store or not active.
    #[error("unknown or inactive project '{project_id}'")]
    UnknownProject {
        /// The requested project.
        project_id: String,
    },

    /// Presented api-key failed the strict prefix rule.
    #[error("api key rejected")]
    InvalidApiKey,

    /// Token shape is wrong (not a JWT, missing or malformed kid, ...).
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The kid names a derivation version this build does not know.
    #[error("unsupported key version v{version}")]
    UnknownKeyVersion {
        /// The rejected version.
        version: u8,
    },

    /// Payload project does not match the kid project.
    #[error("token payload does not match its key id")]
    ProjectMismatch,

    /// Signature did not verify under the derived secret.
    #[error("invalid token signature")]
    InvalidSignature,

    /// Token is past its expiry.
    #[error("token expired")]
    Expired,

    /// Token could not be encoded at issuance.
    #[error("token encoding failed")]
    Encoding(#[source] jsonwebtoken::errors::Error),
}

impl AuthError {
    /// Stable reason category recorded in telemetry and returned to clients.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnknownProject { .. } => "auth_unknown_project",
            Self::Expired => "auth_expired",
            Self::InvalidApiKey
            | Self::MalformedToken(_)
            | Self::UnknownKeyVersion { .. }
            | Self::ProjectMismatch
            | Self::InvalidSignature
            | Self::Encoding(_) => "auth_invalid",
        }
    }
}

impl From<AuthError> for BrokerError {
    fn from(err: AuthError) -> Self {
        Self::Authentication {
            code: err.category(),
        }
    }
}

// ── Claims & Principal ─────────────────────────────────────────────────

/// JWT payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Project the token is scoped to.
    pub project_id: String,
    /// Owning organisation.
    pub organization: String,
    /// Capability tags.
    pub scopes: Vec<String>,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// Expiry, seconds since epoch.
    pub exp: i64,
}

/// A verified caller identity.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    /// Verified project.
    pub project_id: String,
    /// Owning organisation.
    pub organization: String,
    /// Capability tags carried by the token.
    pub scopes: Vec<String>,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

impl Principal {
    /// Require a capability tag, failing with `authorization` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Authorization`] when the scope is absent.
    pub fn require_scope(&self, scope: &str) -> Result<(), BrokerError> {
        if self.scopes.iter().any(|s| s == scope) {
            Ok(())
        } else {
            Err(BrokerError::Authorization(format!(
                "token lacks the '{scope}' scope"
            )))
        }
    }
}

/// Issuance result returned by `/auth/token`.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    /// The signed bearer token.
    pub access_token: String,
    /// Always `bearer`.
    pub token_type: &'static str,
    /// Expiry of the token.
    pub expires_at: DateTime<Utc>,
    /// Project the token is scoped to.
    pub project_id: String,
}

// ── AuthService ────────────────────────────────────────────────────────

/// Issues and verifies project-scoped tokens.
pub struct AuthService {
    master_secret: Vec<u8>,
    expire_minutes: i64,
    projects: Arc<ProjectStore>,
    telemetry: Arc<TelemetryWriter>,
    // Derived secrets are memoized in-process only, never on disk.
    derived: Mutex<FxHashMap<String, [u8; 32]>>,
}

impl AuthService {
    /// Build the service.
    #[must_use]
    pub fn new(
        master_secret: impl Into<Vec<u8>>,
        expire_minutes: i64,
        projects: Arc<ProjectStore>,
        telemetry: Arc<TelemetryWriter>,
    ) -> Self {
        Self {
            master_secret: master_secret.into(),
            expire_minutes,
            projects,
            telemetry,
            derived: Mutex::new(FxHashMap::default()),
        }
    }

    /// Issue a token for `project_id` after verifying the api-key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the project is unknown or inactive, the
    /// api-key fails the strict rule, or encoding fails.
    pub async fn issue_token(
        &self,
        project_id: &str,
        presented_api_key: &str,
    ) -> Result<IssuedToken, AuthError> {
        let project_id = project_id.to_lowercase();
        let project = match self.projects.get(&project_id) {
            Some(p) if p.status == ProjectStatus::Active => p,
            _ => {
                let err = AuthError::UnknownProject {
                    project_id: project_id.clone(),
                };
                self.record_rejection(&project_id, &err).await;
                return Err(err);
            }
        };

        if !api_key::verify(&project, presented_api_key) {
            let err = AuthError::InvalidApiKey;
            self.record_rejection(&project_id, &err).await;
            return Err(err);
        }

        let now = Utc::now();
        let expires_at = now + chrono::Duration::minutes(self.expire_minutes);
        let claims = Claims {
            project_id: project_id.clone(),
            organization: project.organization.clone(),
            scopes: DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(Kid::current(&project_id).to_string());
        let secret = self.derived_secret(&project_id);
        let token = encode(&header, &claims, &EncodingKey::from_secret(&secret))
            .map_err(AuthError::Encoding)?;

        self.record(TelemetryPayload::Authentication {
            project_id: project_id.clone(),
            outcome: AuthOutcome::Success,
            reason: None,
        })
        .await;
        tracing::info!(%project_id, "token issued");

        Ok(IssuedToken {
            access_token: token,
            token_type: "bearer",
            expires_at,
            project_id,
        })
    }

    /// Verify a bearer token and return the caller's [`Principal`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] on any shape, version, signature, expiry, or
    /// project-mismatch violation.
    pub async fn verify_token(&self, token: &str) -> Result<Principal, AuthError> {
        match self.check_token(token) {
            Ok(principal) => Ok(principal),
            Err(err) => {
                let project_id = decode_header(token)
                    .ok()
                    .and_then(|h| h.kid)
                    .and_then(|kid| Kid::parse(&kid))
                    .map_or_else(|| "<unknown>".to_string(), |kid| kid.project_id);
                self.record_rejection(&project_id, &err).await;
                Err(err)
            }
        }
    }

    fn check_token(&self, token: &str) -> Result<Principal, AuthError> {
        let header =
            decode_header(token).map_err(|e| AuthError::MalformedToken(e.to_string()))?;
        let kid_raw = header
            .kid
            .ok_or_else(|| AuthError::MalformedToken("missing kid header".into()))?;
        let kid = Kid::parse(&kid_raw)
            .ok_or_else(|| AuthError::MalformedToken("kid is not of shape p:<project>:v<n>".into()))?;
        if kid.version != KID_VERSION {
            return Err(AuthError::UnknownKeyVersion {
                version: kid.version,
            });
        }

        let secret = self.derived_secret(&kid.project_id);
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<Claims>(token, &DecodingKey::from_secret(&secret), &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::MalformedToken(e.to_string()),
            })?;

        if data.claims.project_id.to_lowercase() != kid.project_id {
            return Err(AuthError::ProjectMismatch);
        }

        let expires_at = Utc
            .timestamp_opt(data.claims.exp, 0)
            .single()
            .ok_or_else(|| AuthError::MalformedToken("exp out of range".into()))?;

        Ok(Principal {
            project_id: data.claims.project_id.to_lowercase(),
            organization: data.claims.organization,
            scopes: data.claims.scopes,
            expires_at,
        })
    }

    fn derived_secret(&self, project_id: &str) -> [u8; 32] {
        let key = project_id.to_lowercase();
        let mut cache = self
            .derived
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *cache
            .entry(key)
            .or_insert_with(|| derive_project_secret(&self.master_secret, project_id))
    }

    async fn record_rejection(&self, project_id: &str, err: &AuthError) {
        tracing::warn!(project_id, reason = err.category(), "authentication rejected");
        self.record(TelemetryPayload::Authentication {
            project_id: project_id.to_string(),
            outcome: AuthOutcome::Rejected,
            reason: Some(err.category().to_string()),
        })
        .await;
    }

    // Audit writes in the auth path are best-effort: a disk failure is
    // logged but does not turn a clean rejection into a 500.
    async fn record(&self, payload: TelemetryPayload) {
        if let Err(error) = self.telemetry.record_event(TelemetryEvent::now(payload)).await {
            tracing::error!(%error, "failed to append authentication event");
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
