//! `/api/v1/llm` handlers.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;

use crate::app::AppState;
use crate::context::TelemetryHeaders;
use crate::error::BrokerError;
use crate::http::middleware::ProjectLabel;
use crate::orchestrator::InvokeRequest;
use crate::stores::ModelInfo;

use super::{bearer, report};

/// Invoke a model through the full pipeline.
pub async fn invoke(
    State(state): State<AppState>,
    Extension(telemetry_headers): Extension<TelemetryHeaders>,
    headers: HeaderMap,
    Json(request): Json<InvokeRequest>,
) -> Result<Response, BrokerError> {
    let token = bearer(&headers)?;
    let principal = match state.auth.verify_token(token).await {
        Ok(principal) => principal,
        Err(err) => return Err(report(&state, err.into(), None).await),
    };
    let project_id = principal.project_id.clone();

    if let Err(err) = principal.require_scope("invoke") {
        return Err(report(&state, err, Some(project_id)).await);
    }

    match state
        .orchestrator
        .invoke(&principal, request, telemetry_headers)
        .await
    {
        Ok(envelope) => {
            let mut response = Json(envelope).into_response();
            response.extensions_mut().insert(ProjectLabel(project_id));
            Ok(response)
        }
        Err(err) => Err(report(&state, err, Some(project_id)).await),
    }
}

/// `/llm/models` response body.
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    /// Caller's project.
    pub project_id: String,
    /// The raw allow-list.
    pub allowed_models: Vec<String>,
    /// Catalog detail for allowed models known to the catalog.
    pub models: Vec<ModelInfo>,
}

/// Enumerate the caller's allowed models.
pub async fn models(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, BrokerError> {
    let token = bearer(&headers)?;
    let principal = match state.auth.verify_token(token).await {
        Ok(principal) => principal,
        Err(err) => return Err(report(&state, err.into(), None).await),
    };
    principal.require_scope("models:read")?;

    let project = state
        .projects
        .get(&principal.project_id)
        .ok_or(BrokerError::Authentication {
            code: "auth_unknown_project",
        })?;

    let mut response = Json(ModelsResponse {
        project_id: project.project_id.clone(),
        models: state.models.for_allow_list(&project.allowed_models),
        allowed_models: project.allowed_models,
    })
    .into_response();
    response
        .extensions_mut()
        .insert(ProjectLabel(principal.project_id));
    Ok(response)
}
