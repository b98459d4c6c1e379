//! Telemetry-header validation for protected endpoints.
//!
//! Every protected request must carry the full SDK header set and a known
//! user-agent prefix. Missing or malformed headers are rejected before
//! authentication runs, and a bypass-attempt event is appended. The
//! middleware never reads the request body.

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::app::AppState;
use crate::context::TelemetryHeaders;
use crate::error::{ErrorBody, ErrorCategory};
use crate::telemetry::{TelemetryEvent, TelemetryPayload};

/// SDK header names.
pub const X_CLIENT_VERSION: &str = "x-bradax-client-version";
pub const X_PLATFORM: &str = "x-bradax-platform";
pub const X_FINGERPRINT: &str = "x-bradax-fingerprint";
pub const X_SESSION_ID: &str = "x-bradax-session-id";
pub const X_TELEMETRY_ENABLED: &str = "x-bradax-telemetry-enabled";
pub const X_ENVIRONMENT: &str = "x-bradax-environment";
pub const X_INTERPRETER: &str = "x-bradax-interpreter-version";

/// Required user-agent prefix.
pub const SDK_USER_AGENT_PREFIX: &str = "bradax-sdk/";

pub async fn validate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match parse_headers(req.headers()) {
        Ok(parsed) => {
            req.extensions_mut().insert(parsed);
            next.run(req).await
        }
        Err(violation) => {
            tracing::warn!(violation, "telemetry header validation failed");
            if let Err(error) = state
                .telemetry
                .record_event(TelemetryEvent::now(TelemetryPayload::Error {
                    request_id: None,
                    project_id: None,
                    category: ErrorCategory::Validation.as_str().to_string(),
                    code: "telemetry_bypass_attempt".into(),
                }))
                .await
            {
                tracing::error!(%error, "failed to append bypass-attempt event");
            }
            (
                StatusCode::FORBIDDEN,
                Json(ErrorBody {
                    error: ErrorCategory::Validation,
                    code: "telemetry_validation_failed".into(),
                    message: format!("telemetry headers rejected: {violation}"),
                }),
            )
                .into_response()
        }
    }
}

fn parse_headers(headers: &HeaderMap) -> Result<TelemetryHeaders, &'static str> {
    let ua = get(headers, header::USER_AGENT.as_str()).ok_or("missing user-agent")?;
    if !ua.starts_with(SDK_USER_AGENT_PREFIX) {
        return Err("unknown user-agent prefix");
    }

    let enabled = get(headers, X_TELEMETRY_ENABLED).ok_or("missing telemetry-enabled flag")?;
    if enabled != "true" {
        return Err("telemetry-enabled flag must be true");
    }

    Ok(TelemetryHeaders {
        client_version: get(headers, X_CLIENT_VERSION)
            .ok_or("missing client version")?
            .to_string(),
        platform: get(headers, X_PLATFORM).ok_or("missing platform")?.to_string(),
        fingerprint: get(headers, X_FINGERPRINT)
            .ok_or("missing fingerprint")?
            .to_string(),
        session_id: get(headers, X_SESSION_ID)
            .ok_or("missing session id")?
            .to_string(),
        environment: get(headers, X_ENVIRONMENT)
            .ok_or("missing environment")?
            .to_string(),
        interpreter_version: get(headers, X_INTERPRETER)
            .ok_or("missing interpreter version")?
            .to_string(),
    })
}

fn get<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn full_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("bradax-sdk/1.0.0"));
        headers.insert(X_CLIENT_VERSION, HeaderValue::from_static("1.0.0"));
        headers.insert(X_PLATFORM, HeaderValue::from_static("linux"));
        headers.insert(X_FINGERPRINT, HeaderValue::from_static("fp-123"));
        headers.insert(X_SESSION_ID, HeaderValue::from_static("sess-1"));
        headers.insert(X_TELEMETRY_ENABLED, HeaderValue::from_static("true"));
        headers.insert(X_ENVIRONMENT, HeaderValue::from_static("staging"));
        headers.insert(X_INTERPRETER, HeaderValue::from_static("3.12.1"));
        headers
    }

    #[test]
    fn full_set_parses() {
        let parsed = parse_headers(&full_headers()).unwrap();
        assert_eq!(parsed.client_version, "1.0.0");
        assert_eq!(parsed.session_id, "sess-1");
    }

    #[test]
    fn each_missing_header_rejects() {
        for name in [
            X_CLIENT_VERSION,
            X_PLATFORM,
            X_FINGERPRINT,
            X_SESSION_ID,
            X_TELEMETRY_ENABLED,
            X_ENVIRONMENT,
            X_INTERPRETER,
        ] {
            let mut headers = full_headers();
            headers.remove(name);
            assert!(parse_headers(&headers).is_err(), "{name} was not required");
        }
    }

    #[test]
    fn disabled_flag_rejects() {
        let mut headers = full_headers();
        headers.insert(X_TELEMETRY_ENABLED, HeaderValue::from_static("false"));
        assert_eq!(
            parse_headers(&headers).unwrap_err(),
            "telemetry-enabled flag must be true"
        );
    }

    #[test]
    fn foreign_user_agent_rejects() {
        let mut headers = full_headers();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.0"));
        assert_eq!(parse_headers(&headers).unwrap_err(), "unknown user-agent prefix");
    }

    #[test]
    fn blank_header_value_rejects() {
        let mut headers = full_headers();
        headers.insert(X_PLATFORM, HeaderValue::from_static("  "));
        assert!(parse_headers(&headers).is_err());
    }
}
