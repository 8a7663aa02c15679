//! Document generation endpoints
//!
//! Responses are raw `text/plain` chunks streamed as the model produces them.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::TryStreamExt;
use serde::Deserialize;
use specdrafter_common::Project;

use crate::db::projects;
use crate::services::documents::{self, DEFAULT_PRD_TARGET};
use crate::services::TextStream;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    /// Edit instruction
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct GeneratePrdRequest {
    #[serde(default = "default_target")]
    pub target: String,
}

fn default_target() -> String {
    DEFAULT_PRD_TARGET.to_string()
}

async fn load_project(state: &AppState, project_id: &str) -> ApiResult<Project> {
    projects::get_project(&state.db, project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Project {}", project_id)))
}

fn text_response(project_id: String, stream: TextStream) -> Response {
    let body = stream.inspect_err(move |e| {
        tracing::error!(project_id = %project_id, error = %e, "Document stream failed");
    });
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response()
}

/// POST /projects/:id/edit-requirements
pub async fn edit_requirements(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    payload: Result<Json<EditRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;
    let project = load_project(&state, &project_id).await?;

    let stream = documents::edit_requirements(
        &state.gateway,
        project.requirements_content(),
        &request.content,
    )
    .await?;
    Ok(text_response(project_id, stream))
}

/// POST /projects/:id/generate-prd
///
/// The body is optional; the target defaults to "Cursor".
pub async fn generate_prd(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    payload: Option<Json<GeneratePrdRequest>>,
) -> ApiResult<Response> {
    let target = payload
        .map(|Json(request)| request.target)
        .unwrap_or_else(default_target);
    let project = load_project(&state, &project_id).await?;

    let today = chrono::Local::now().date_naive();
    let stream =
        documents::generate_prd(&state.gateway, &project.conversation_history, &target, today)
            .await?;
    Ok(text_response(project_id, stream))
}

/// POST /projects/:id/review
pub async fn review(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Response> {
    let project = load_project(&state, &project_id).await?;

    let stream = documents::review(&state.gateway, &project.conversation_history).await?;
    Ok(text_response(project_id, stream))
}

pub fn document_routes() -> Router<AppState> {
    Router::new()
        .route("/projects/:id/edit-requirements", post(edit_requirements))
        .route("/projects/:id/generate-prd", post(generate_prd))
        .route("/projects/:id/review", post(review))
}
