//! Project lifecycle endpoints
//!
//! - `POST /projects` create (seeded with the welcome message)
//! - `GET /projects` list, most recently updated first
//! - `GET /projects/:id`
//! - `PATCH /projects/:id` name / description / requirements
//! - `PATCH /projects/:id/rename`
//! - `DELETE /projects/:id`

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use specdrafter_common::models::ProjectUpdate;
use specdrafter_common::{ConversationEntry, Project};
use tracing::{info, warn};

use crate::db::projects;
use crate::services::prompts::WELCOME_MESSAGE;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

/// POST /projects
pub async fn create_project(State(state): State<AppState>) -> ApiResult<Json<Project>> {
    let mut project = Project::new();
    project
        .conversation_history
        .push(ConversationEntry::assistant(WELCOME_MESSAGE, None));

    projects::create_project(&state.db, &project).await?;
    Ok(Json(project))
}

/// GET /projects
pub async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Vec<Project>>> {
    Ok(Json(projects::list_projects(&state.db).await?))
}

/// GET /projects/:id
pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Project>> {
    projects::get_project(&state.db, &project_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Project {}", project_id)))
}

/// PATCH /projects/:id
///
/// Unknown fields are ignored; `current_phase` in particular is not
/// patchable.
pub async fn update_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    payload: Result<Json<ProjectUpdate>, JsonRejection>,
) -> ApiResult<Json<Project>> {
    let Json(update) = payload?;

    let project = if update.is_empty() {
        projects::get_project(&state.db, &project_id).await?
    } else {
        projects::update_project(&state.db, &project_id, &update).await?
    };

    project
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Project {}", project_id)))
}

/// PATCH /projects/:id/rename
pub async fn rename_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    payload: Result<Json<RenameRequest>, JsonRejection>,
) -> ApiResult<Json<Project>> {
    let Json(request) = payload?;
    let name = request.name.trim();

    let project = projects::rename_project(&state.db, &project_id, name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Project {}", project_id)))?;

    info!(project_id = %project_id, name = %name, "Renamed project");
    Ok(Json(project))
}

/// DELETE /projects/:id
///
/// 204 whether or not the project existed.
pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<StatusCode> {
    if projects::delete_project(&state.db, &project_id).await? {
        info!(project_id = %project_id, "Deleted project");
    } else {
        warn!(project_id = %project_id, "Project not found for deletion");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Build project routes
pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/", get(list_projects).post(create_project))
        .route(
            "/projects/:id",
            get(get_project).patch(update_project).delete(delete_project),
        )
        .route("/projects/:id/rename", patch(rename_project))
}
