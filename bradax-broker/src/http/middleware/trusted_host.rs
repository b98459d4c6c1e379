//! Trusted-host filter.
//!
//! Rejects requests whose `Host` header (port stripped, case-folded) is not
//! on the configured allow-list. An empty allow-list disables the filter.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::app::AppState;
use crate::error::BrokerError;

pub async fn filter(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if state.settings.trusted_hosts.is_empty() {
        return next.run(req).await;
    }

    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|h| h.split(':').next().unwrap_or(h).to_lowercase());

    match host {
        Some(host) if state.settings.trusted_hosts.iter().any(|t| *t == host) => {
            next.run(req).await
        }
        other => {
            tracing::warn!(host = other.as_deref().unwrap_or("<missing>"), "untrusted host rejected");
            BrokerError::Validation("unknown host header".into()).into_response()
        }
    }
}
