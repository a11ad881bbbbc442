use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::candidates::store::{self, CandidateWithDetails, DetailsInput};
use crate::errors::AppError;
use crate::models::candidate::CandidateDetailsRow;
use crate::state::AppState;

/// GET /api/v1/candidates/:id
pub async fn handle_get_candidate(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CandidateWithDetails>, AppError> {
    Ok(Json(store::get_candidate(&state.db, id).await?))
}

/// PUT /api/v1/candidates/:id/details
pub async fn handle_upsert_details(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
    Json(details): Json<DetailsInput>,
) -> Result<Json<CandidateDetailsRow>, AppError> {
    if !store::candidate_exists(&state.db, id).await? {
        return Err(AppError::NotFound(format!("Candidate {id} not found")));
    }
    if !details.employment_history.is_array() || !details.education.is_array() {
        return Err(AppError::Validation(
            "employment_history and education must be arrays".to_string(),
        ));
    }
    Ok(Json(store::upsert_details(&state.db, id, &details).await?))
}
