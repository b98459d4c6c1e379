//! `/health` and `/api/v1/system` handlers.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::app::AppState;
use crate::error::BrokerError;
use crate::telemetry::TelemetryEvent;

use super::{bearer, report};

/// Liveness probe body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` when the process is serving.
    pub status: &'static str,
    /// Broker version.
    pub version: &'static str,
}

/// `/health`.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `/system/info` body.
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    /// Service name.
    pub name: &'static str,
    /// Broker version.
    pub version: &'static str,
    /// Deployment environment label.
    pub environment: &'static str,
}

/// `/system/info`.
pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "bradax-broker",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.settings.environment.as_str(),
    })
}

/// Ingest acknowledgement.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// Number of events appended.
    pub accepted: usize,
}

/// `/system/telemetry` — ingest SDK-side events into the main stream.
/// Accepts a single event or an array of events.
pub async fn ingest_telemetry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<IngestResponse>), BrokerError> {
    let token = bearer(&headers)?;
    let principal = match state.auth.verify_token(token).await {
        Ok(principal) => principal,
        Err(err) => return Err(report(&state, err.into(), None).await),
    };
    principal.require_scope("telemetry:write")?;

    let raw_events = match body {
        Value::Array(items) => items,
        single => vec![single],
    };
    let mut events = Vec::with_capacity(raw_events.len());
    for raw in raw_events {
        let event: TelemetryEvent = serde_json::from_value(raw).map_err(|e| {
            BrokerError::Validation(format!("telemetry event does not parse: {e}"))
        })?;
        events.push(event);
    }

    let accepted = events.len();
    for event in events {
        state
            .telemetry
            .record_event(event)
            .await
            .map_err(|e| BrokerError::Internal(format!("telemetry append failed: {e}")))?;
    }

    Ok((StatusCode::ACCEPTED, Json(IngestResponse { accepted })))
}
