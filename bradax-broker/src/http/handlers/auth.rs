//! `/api/v1/auth` handlers.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::BrokerError;
use crate::http::middleware::ProjectLabel;
use crate::stores::ProjectStatus;

use super::{bearer, report};

/// `/auth/token` request body.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    /// Project to issue for.
    pub project_id: String,
    /// Structured api-key.
    pub api_key: String,
}

/// Issue a project-scoped token.
pub async fn token(
    State(state): State<AppState>,
    Json(body): Json<TokenRequest>,
) -> Result<Response, BrokerError> {
    match state.auth.issue_token(&body.project_id, &body.api_key).await {
        Ok(issued) => {
            let project_id = issued.project_id.clone();
            let mut response = Json(issued).into_response();
            response.extensions_mut().insert(ProjectLabel(project_id));
            Ok(response)
        }
        Err(err) => Err(report(&state, err.into(), Some(body.project_id.to_lowercase())).await),
    }
}

/// `/auth/validate` response body.
#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    /// Always `true` when the request succeeds.
    pub valid: bool,
    /// Verified project.
    pub project_id: String,
    /// Capability tags carried by the token.
    pub scopes: Vec<String>,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

/// Validate a bearer token; 403 when the project is no longer active.
pub async fn validate(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, BrokerError> {
    let token = bearer(&headers)?;
    let principal = match state.auth.verify_token(token).await {
        Ok(principal) => principal,
        Err(err) => return Err(report(&state, err.into(), None).await),
    };

    let active = state
        .projects
        .get(&principal.project_id)
        .is_some_and(|p| p.status == ProjectStatus::Active);
    if !active {
        let err = BrokerError::Authorization("project is not active".into());
        return Err(report(&state, err, Some(principal.project_id)).await);
    }

    let mut response = Json(ValidateResponse {
        valid: true,
        project_id: principal.project_id.clone(),
        scopes: principal.scopes,
        expires_at: principal.expires_at,
    })
    .into_response();
    response
        .extensions_mut()
        .insert(ProjectLabel(principal.project_id));
    Ok(response)
}
