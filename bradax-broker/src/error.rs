//! Broker-wide error taxonomy.
//!
//! The taxonomy is used uniformly: `validation`, `authentication`,
//! `authorization`, and `rate_limited` surface as native 4xx responses;
//! guardrail blocks and provider failures are fail-soft (HTTP 200 envelopes
//! composed by the orchestrator, not errors); `internal` surfaces as 5xx.
//! Response bodies carry a stable machine-readable `code` and never leak
//! payload content.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

// ── ErrorCategory ──────────────────────────────────────────────────────

/// The taxonomy bucket recorded on `error` telemetry events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed request or invalid custom guardrail.
    Validation,
    /// Missing, invalid, or expired credentials.
    Authentication,
    /// Credentials valid but operation not permitted.
    Authorization,
    /// Over per-IP or concurrency bounds.
    RateLimited,
    /// Content policy terminal action was `block`.
    GuardrailBlocked,
    /// Upstream failure (network, timeout, remote 4xx/5xx).
    ProviderError,
    /// Unhandled failure.
    Internal,
}

impl ErrorCategory {
    /// Stable snake_case label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::RateLimited => "rate_limited",
            Self::GuardrailBlocked => "guardrail_blocked",
            Self::ProviderError => "provider_error",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Stable reason codes ────────────────────────────────────────────────

/// Reason codes carried by fail-soft envelopes and telemetry events.
pub mod reason {
    /// Content policy terminal action was `block`.
    pub const GUARDRAIL_BLOCKED: &str = "guardrail_blocked";
    /// Upstream provider failed.
    pub const PROVIDER_ERROR: &str = "provider_error";
    /// Upstream provider exceeded its deadline.
    pub const PROVIDER_TIMEOUT: &str = "provider_timeout";
    /// Model not in the project's allow-list.
    pub const POLICY_BLOCKED: &str = "policy_blocked";
    /// Request-level validation failed (e.g. custom guardrail regex).
    pub const VALIDATION_ERROR: &str = "validation_error";
}

// ── BrokerError ────────────────────────────────────────────────────────

/// Errors that surface as native HTTP status codes.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Malformed request shape.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Credential rejection; `code` is the stable reason category
    /// (`auth_unknown_project`, `auth_invalid`, `auth_expired`).
    #[error("authentication failed ({code})")]
    Authentication {
        /// Stable rejection code, never the credential itself.
        code: &'static str,
    },

    /// Valid credentials, forbidden operation.
    #[error("forbidden: {0}")]
    Authorization(String),

    /// Over rate or concurrency bounds.
    #[error("rate limit exceeded")]
    RateLimited {
        /// Seconds until the window has room again.
        retry_after: u64,
    },

    /// Unhandled internal failure. The message is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    /// Taxonomy bucket for telemetry.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Authentication { .. } => ErrorCategory::Authentication,
            Self::Authorization(_) => ErrorCategory::Authorization,
            Self::RateLimited { .. } => ErrorCategory::RateLimited,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Stable machine-readable code returned to clients.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Authentication { code } => code,
            Self::Authorization(_) => "forbidden",
            Self::RateLimited { .. } => "rate_limited",
            Self::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error envelope returned for native-status failures.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Taxonomy bucket.
    pub error: ErrorCategory,
    /// Stable machine-readable code.
    pub code: String,
    /// Short operator-safe description.
    pub message: String,
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Internal details stay in the logs.
            Self::Internal(detail) => {
                tracing::error!(detail = %detail, "internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: self.category(),
            code: self.code().to_string(),
            message,
        };
        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited { retry_after } = self
            && let Ok(value) = retry_after.to_string().parse()
        {
            response.headers_mut().insert("retry-after", value);
        }
        response
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_have_stable_labels() {
        assert_eq!(ErrorCategory::RateLimited.as_str(), "rate_limited");
        assert_eq!(ErrorCategory::GuardrailBlocked.as_str(), "guardrail_blocked");
        assert_eq!(
            serde_json::to_string(&ErrorCategory::ProviderError).unwrap(),
            r#""provider_error""#
        );
    }

    #[test]
    fn statuses_follow_the_propagation_policy() {
        assert_eq!(
            BrokerError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BrokerError::Authentication { code: "auth_invalid" }.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            BrokerError::Authorization("no scope".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            BrokerError::RateLimited { retry_after: 1 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            BrokerError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_detail_not_leaked() {
        let response = BrokerError::Internal("secret detail".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
