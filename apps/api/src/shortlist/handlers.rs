use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::candidates::store::CandidateInput;
use crate::errors::AppError;
use crate::models::candidate::ShortlistedCandidateRow;
use crate::shortlist::store::{self, AddOutcome, RemoveOutcome};
use crate::state::AppState;

/// Either a normalised candidate or a raw element of a search response.
#[derive(Debug, Deserialize)]
pub struct AddToShortlistRequest {
    pub candidate: Option<CandidateInput>,
    #[serde(rename = "match")]
    pub match_result: Option<Value>,
    pub notes: Option<String>,
}

impl AddToShortlistRequest {
    fn candidate_input(&self) -> Result<CandidateInput, AppError> {
        match (&self.candidate, &self.match_result) {
            (Some(candidate), _) => Ok(candidate.clone()),
            (None, Some(raw)) => CandidateInput::from_match(raw),
            (None, None) => Err(AppError::Validation(
                "either candidate or match is required".to_string(),
            )),
        }
    }
}

#[derive(Serialize)]
pub struct RecountResponse {
    pub shortlist_count: i32,
}

/// POST /api/v1/projects/:id/shortlist
pub async fn handle_add(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
    Json(req): Json<AddToShortlistRequest>,
) -> Result<(StatusCode, Json<AddOutcome>), AppError> {
    let input = req.candidate_input()?;
    let outcome =
        store::add_to_shortlist(&state.db, user.id, project_id, &input, req.notes.as_deref())
            .await?;
    let status = if outcome.added {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

/// DELETE /api/v1/projects/:id/shortlist/:candidate_id
pub async fn handle_remove(
    State(state): State<AppState>,
    user: AuthUser,
    Path((project_id, candidate_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RemoveOutcome>, AppError> {
    Ok(Json(
        store::remove_from_shortlist(&state.db, user.id, project_id, candidate_id).await?,
    ))
}

/// GET /api/v1/projects/:id/shortlist
pub async fn handle_list(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<ShortlistedCandidateRow>>, AppError> {
    Ok(Json(
        store::list_shortlist(&state.db, user.id, project_id).await?,
    ))
}

/// POST /api/v1/projects/:id/shortlist/recount
pub async fn handle_recount(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<RecountResponse>, AppError> {
    let shortlist_count = store::recount(&state.db, user.id, project_id).await?;
    Ok(Json(RecountResponse { shortlist_count }))
}
