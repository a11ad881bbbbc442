use axum::{extract::State, Json};

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::profile::ProfileRow;
use crate::profiles::store::{self, ProfilePatch};
use crate::state::AppState;

/// GET /api/v1/profile
pub async fn handle_get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ProfileRow>, AppError> {
    Ok(Json(
        store::get_or_create_profile(&state.db, user.id, user.email.as_deref()).await?,
    ))
}

/// PATCH /api/v1/profile
pub async fn handle_update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<ProfileRow>, AppError> {
    Ok(Json(
        store::update_profile(&state.db, user.id, user.email.as_deref(), &patch).await?,
    ))
}
