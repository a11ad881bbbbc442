use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::project::ProjectRow;
use crate::projects::store::{self, NewProject, ProjectPatch};
use crate::state::AppState;

/// POST /api/v1/projects
pub async fn handle_create_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<NewProject>,
) -> Result<(StatusCode, Json<ProjectRow>), AppError> {
    let project = store::create_project(&state.db, user.id, &req).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/v1/projects
pub async fn handle_list_projects(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ProjectRow>>, AppError> {
    Ok(Json(store::list_projects(&state.db, user.id).await?))
}

/// GET /api/v1/projects/:id
pub async fn handle_get_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectRow>, AppError> {
    Ok(Json(store::get_project(&state.db, user.id, id).await?))
}

/// PATCH /api/v1/projects/:id
pub async fn handle_update_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<ProjectPatch>,
) -> Result<Json<ProjectRow>, AppError> {
    Ok(Json(
        store::update_project(&state.db, user.id, id, &patch).await?,
    ))
}

/// DELETE /api/v1/projects/:id
pub async fn handle_delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    store::delete_project(&state.db, user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
