use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::search::{SearchResultRow, SearchRow};
use crate::search::chat::{run_chat_search, ChatSearchRequest};
use crate::search::store;
use crate::state::AppState;

/// POST /api/v1/search/chat
///
/// Returns the matching API's payload verbatim; `session_id` is added when
/// this call started the session.
pub async fn handle_chat_search(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ChatSearchRequest>,
) -> Result<Json<Value>, AppError> {
    let payload = run_chat_search(&state.db, state.matcher.as_ref(), &user, &req).await?;
    Ok(Json(payload))
}

/// GET /api/v1/projects/:id/searches
pub async fn handle_list_searches(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<SearchRow>>, AppError> {
    Ok(Json(
        store::list_searches(&state.db, user.id, project_id).await?,
    ))
}

/// GET /api/v1/searches/:id/results
pub async fn handle_search_results(
    State(state): State<AppState>,
    user: AuthUser,
    Path(search_id): Path<Uuid>,
) -> Result<Json<Vec<SearchResultRow>>, AppError> {
    Ok(Json(store::get_results(&state.db, user.id, search_id).await?))
}
