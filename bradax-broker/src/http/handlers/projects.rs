//! `/api/v1/projects` admin handlers.
//!
//! Thin operator surface over the project store; the invocation core only
//! ever reads projects. Writes go through the store's atomic-replace path.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;

use crate::app::AppState;
use crate::error::{BrokerError, ErrorBody, ErrorCategory};
use crate::stores::{Project, ProjectStatus, StoreError};

/// Create/update body.
#[derive(Debug, Deserialize)]
pub struct ProjectUpsert {
    /// Stable identifier; lowercased on write.
    pub project_id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Owning organisation.
    #[serde(default)]
    pub organization: String,
    /// Opaque api-key fingerprint.
    pub api_key_hash: String,
    /// Allowed model ids.
    pub allowed_models: Vec<String>,
    /// Lifecycle state.
    pub status: ProjectStatus,
    /// Remaining budget in USD.
    pub budget_remaining: f64,
}

fn not_found(project_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: ErrorCategory::Validation,
            code: "not_found".into(),
            message: format!("unknown project '{project_id}'"),
        }),
    )
        .into_response()
}

fn store_err(err: StoreError) -> BrokerError {
    match err {
        StoreError::Integrity { message } => BrokerError::Validation(message),
        other => BrokerError::Internal(other.to_string()),
    }
}

/// List every project.
pub async fn list(State(state): State<AppState>) -> Json<Vec<Project>> {
    let mut projects: Vec<Project> = state.projects.all().values().cloned().collect();
    projects.sort_by(|a, b| a.project_id.cmp(&b.project_id));
    Json(projects)
}

/// Fetch one project.
pub async fn get(State(state): State<AppState>, Path(project_id): Path<String>) -> Response {
    match state.projects.get(&project_id.to_lowercase()) {
        Some(project) => Json(project).into_response(),
        None => not_found(&project_id),
    }
}

/// Create a project.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<ProjectUpsert>,
) -> Result<(StatusCode, Json<Project>), BrokerError> {
    let project_id = body.project_id.to_lowercase();
    if state.projects.get(&project_id).is_some() {
        return Err(BrokerError::Validation(format!(
            "project '{project_id}' already exists"
        )));
    }
    let project = materialize(body, None);
    state.projects.upsert(project.clone()).map_err(store_err)?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// Replace a project.
pub async fn update(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(body): Json<ProjectUpsert>,
) -> Result<Response, BrokerError> {
    let project_id = project_id.to_lowercase();
    if body.project_id.to_lowercase() != project_id {
        return Err(BrokerError::Validation(
            "body project_id does not match the path".into(),
        ));
    }
    let Some(existing) = state.projects.get(&project_id) else {
        return Ok(not_found(&project_id));
    };
    let project = materialize(body, Some(&existing));
    state.projects.upsert(project.clone()).map_err(store_err)?;
    Ok(Json(project).into_response())
}

/// Delete a project.
pub async fn remove(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Response, BrokerError> {
    let project_id = project_id.to_lowercase();
    if state.projects.get(&project_id).is_none() {
        return Ok(not_found(&project_id));
    }
    state.projects.remove(&project_id).map_err(store_err)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn materialize(body: ProjectUpsert, existing: Option<&Project>) -> Project {
    let now = Utc::now();
    Project {
        project_id: body.project_id.to_lowercase(),
        name: body.name,
        description: body.description,
        organization: body.organization,
        api_key_hash: body.api_key_hash,
        allowed_models: body.allowed_models,
        status: body.status,
        budget_remaining: body.budget_remaining,
        created_at: existing.map_or(now, |p| p.created_at),
        updated_at: now,
    }
}
