//! Route handlers.

pub mod auth;
pub mod llm;
pub mod projects;
pub mod system;

use axum::http::{HeaderMap, header};

use crate::app::AppState;
use crate::error::BrokerError;
use crate::telemetry::{TelemetryEvent, TelemetryPayload};

/// Extract the bearer token from `Authorization`.
pub(crate) fn bearer(headers: &HeaderMap) -> Result<&str, BrokerError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(BrokerError::Authentication {
            code: "auth_invalid",
        })
}

/// Append the taxonomy `error` event for a natively-surfaced failure and
/// hand the error back for the response path.
pub(crate) async fn report(
    state: &AppState,
    err: BrokerError,
    project_id: Option<String>,
) -> BrokerError {
    if let Err(error) = state
        .telemetry
        .record_event(TelemetryEvent::now(TelemetryPayload::Error {
            request_id: None,
            project_id,
            category: err.category().as_str().to_string(),
            code: err.code().to_string(),
        }))
        .await
    {
        tracing::error!(%error, "failed to append error event");
    }
    err
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer(&headers).is_err());

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer tok.en.sig"),
        );
        assert_eq!(bearer(&headers).unwrap(), "tok.en.sig");
    }
}
