//! Structured request logging.
//!
//! Assigns the `request_id` when the client did not send one, stamps it on
//! the response, and emits one structured line per request — route, method,
//! status, duration, and the project when a handler attached it. Payload
//! bodies are never logged.

use std::time::Instant;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

/// Correlation id assigned at ingress, readable by handlers.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

/// Project label a handler may attach to its response for the access log.
#[derive(Debug, Clone)]
pub struct ProjectLabel(pub String);

pub async fn log(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .unwrap_or_else(Uuid::new_v4);
    req.extensions_mut().insert(RequestId(request_id));

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert("x-request-id", value);
    }
    let project = response
        .extensions()
        .get::<ProjectLabel>()
        .map(|p| p.0.clone());

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        project_id = project.as_deref().unwrap_or("-"),
        "request"
    );

    response
}
