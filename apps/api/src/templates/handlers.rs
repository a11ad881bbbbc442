use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::template::GlobalTemplateRow;
use crate::state::AppState;
use crate::templates::store::{self, GlobalTemplateDetail, GlobalTemplatePatch, NewGlobalTemplate};

/// POST /api/v1/global-templates
pub async fn handle_create_template(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<NewGlobalTemplate>,
) -> Result<(StatusCode, Json<GlobalTemplateDetail>), AppError> {
    let detail = store::create_template(&state.db, user.id, &req).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// GET /api/v1/global-templates
pub async fn handle_list_templates(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<GlobalTemplateRow>>, AppError> {
    Ok(Json(store::list_templates(&state.db, user.id).await?))
}

/// GET /api/v1/global-templates/:id
pub async fn handle_get_template(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<GlobalTemplateDetail>, AppError> {
    Ok(Json(store::get_template(&state.db, user.id, id).await?))
}

/// PATCH /api/v1/global-templates/:id
pub async fn handle_update_template(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<GlobalTemplatePatch>,
) -> Result<Json<GlobalTemplateDetail>, AppError> {
    Ok(Json(
        store::update_template(&state.db, user.id, id, &patch).await?,
    ))
}

/// DELETE /api/v1/global-templates/:id
pub async fn handle_delete_template(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    store::delete_template(&state.db, user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
