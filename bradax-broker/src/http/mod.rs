//! HTTP surface.
//!
//! [`build_router`] assembles the v1 routes under the fixed middleware
//! chain: trusted host → CORS (non-production only) → security headers →
//! rate limiter → request logger, with telemetry-header validation nested
//! on the protected routes so it runs last, immediately before the
//! handlers.

pub mod handlers;
pub mod middleware;

use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::app::AppState;

/// Build the full v1 router over the given state.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/v1/llm/invoke", post(handlers::llm::invoke))
        .route("/api/v1/llm/models", get(handlers::llm::models))
        .route(
            "/api/v1/system/telemetry",
            post(handlers::system::ingest_telemetry),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::telemetry_guard::validate,
        ));

    let admin = Router::new()
        .route(
            "/api/v1/projects",
            get(handlers::projects::list).post(handlers::projects::create),
        )
        .route(
            "/api/v1/projects/{project_id}",
            get(handlers::projects::get)
                .put(handlers::projects::update)
                .delete(handlers::projects::remove),
        );

    let open = Router::new()
        .route("/api/v1/auth/token", post(handlers::auth::token))
        .route("/api/v1/auth/validate", post(handlers::auth::validate))
        .route("/api/v1/system/info", get(handlers::system::info))
        .route("/health", get(handlers::system::health));

    let cors = if state.settings.environment.is_production() {
        None
    } else {
        Some(CorsLayer::permissive())
    };

    Router::new()
        .merge(protected)
        .merge(admin)
        .merge(open)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(
                    state.clone(),
                    middleware::trusted_host::filter,
                ))
                .option_layer(cors)
                .layer(from_fn(middleware::security_headers::apply))
                .layer(from_fn_with_state(
                    state.clone(),
                    middleware::rate_limit::limit,
                ))
                .layer(from_fn(middleware::request_log::log)),
        )
        .with_state(state)
}
