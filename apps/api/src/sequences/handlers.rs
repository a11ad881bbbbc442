use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::sequence::{EmailLogRow, RecipientRow, SequenceRow};
use crate::sequences::dispatch::{dispatch_due, DispatchReport};
use crate::sequences::store::{
    self, EnrollOutcome, EnrollRequest, FromTemplateRequest, NewSequence, RecipientEvent,
    SequenceDetail, SequenceStatus,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SequenceFilter {
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: SequenceStatus,
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub event: RecipientEvent,
}

/// POST /api/v1/sequences
pub async fn handle_create_sequence(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<NewSequence>,
) -> Result<(StatusCode, Json<SequenceDetail>), AppError> {
    let detail = store::create_sequence(&state.db, user.id, &req).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// POST /api/v1/sequences/from-template
pub async fn handle_create_from_template(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<FromTemplateRequest>,
) -> Result<(StatusCode, Json<SequenceDetail>), AppError> {
    let detail = store::create_from_template(&state.db, user.id, &req).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// GET /api/v1/sequences?project_id=
pub async fn handle_list_sequences(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filter): Query<SequenceFilter>,
) -> Result<Json<Vec<SequenceRow>>, AppError> {
    Ok(Json(
        store::list_sequences(&state.db, user.id, filter.project_id).await?,
    ))
}

/// GET /api/v1/sequences/:id
pub async fn handle_get_sequence(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SequenceDetail>, AppError> {
    Ok(Json(store::get_sequence(&state.db, user.id, id).await?))
}

/// PATCH /api/v1/sequences/:id/status
pub async fn handle_update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<SequenceRow>, AppError> {
    Ok(Json(
        store::update_status(&state.db, user.id, id, req.status).await?,
    ))
}

/// DELETE /api/v1/sequences/:id
pub async fn handle_delete_sequence(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    store::delete_sequence(&state.db, user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sequences/:id/recipients
pub async fn handle_enroll(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<EnrollRequest>,
) -> Result<Json<EnrollOutcome>, AppError> {
    Ok(Json(
        store::enroll_recipients(&state.db, user.id, id, &req).await?,
    ))
}

/// GET /api/v1/sequences/:id/recipients
pub async fn handle_list_recipients(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RecipientRow>>, AppError> {
    Ok(Json(store::list_recipients(&state.db, user.id, id).await?))
}

/// DELETE /api/v1/sequences/:id/recipients/:rid
pub async fn handle_remove_recipient(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, recipient_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    store::remove_recipient(&state.db, user.id, id, recipient_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/sequences/:id/logs
pub async fn handle_list_logs(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EmailLogRow>>, AppError> {
    Ok(Json(store::list_logs(&state.db, user.id, id).await?))
}

/// POST /api/v1/recipients/:rid/events
pub async fn handle_record_event(
    State(state): State<AppState>,
    user: AuthUser,
    Path(recipient_id): Path<Uuid>,
    Json(req): Json<EventRequest>,
) -> Result<Json<RecipientRow>, AppError> {
    Ok(Json(
        store::record_event(&state.db, user.id, recipient_id, req.event).await?,
    ))
}

/// POST /api/v1/sequences/dispatch
///
/// Runs one dispatch pass immediately, across all active sequences.
pub async fn handle_dispatch(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<DispatchReport>, AppError> {
    tracing::info!("Manual dispatch requested by {}", user.id);
    let report = dispatch_due(
        &state.db,
        &state.outbound,
        Utc::now(),
        state.config.dispatch_batch_size,
    )
    .await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_request_parses_snake_case() {
        let req: EventRequest = serde_json::from_value(json!({"event": "unsubscribed"})).unwrap();
        assert_eq!(req.event, RecipientEvent::Unsubscribed);
        assert!(serde_json::from_value::<EventRequest>(json!({"event": "spam"})).is_err());
    }

    #[test]
    fn test_status_request_rejects_unknown_status() {
        let req: StatusRequest = serde_json::from_value(json!({"status": "paused"})).unwrap();
        assert_eq!(req.status, SequenceStatus::Paused);
        assert!(serde_json::from_value::<StatusRequest>(json!({"status": "done"})).is_err());
    }
}
