use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::{conflict_on_unique, AppError};
use crate::models::search::{SearchResultRow, SearchRow};
use crate::projects::store::get_project;
use crate::search::session::SESSION_UNAVAILABLE;

/// Looks up one of the caller's sessions. Sessions of other users are invisible.
pub async fn find_by_session(
    pool: &PgPool,
    user_id: Uuid,
    session_id: &str,
) -> Result<Option<SearchRow>, AppError> {
    Ok(sqlx::query_as::<_, SearchRow>(
        "SELECT * FROM searches WHERE session_id = $1 AND user_id = $2",
    )
    .bind(session_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?)
}

pub async fn create_search(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
    session_id: &str,
    query: &str,
) -> Result<SearchRow, AppError> {
    sqlx::query_as::<_, SearchRow>(
        r#"
        INSERT INTO searches (project_id, user_id, session_id, query)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(project_id)
    .bind(user_id)
    .bind(session_id)
    .bind(query)
    .fetch_one(pool)
    .await
    .map_err(|e| conflict_on_unique(e, SESSION_UNAVAILABLE))
}

pub async fn touch_search(pool: &PgPool, search_id: Uuid) -> Result<(), AppError> {
    sqlx::query("UPDATE searches SET updated_at = now() WHERE id = $1")
        .bind(search_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_result(
    pool: &PgPool,
    search_id: Uuid,
    message: &str,
    response: &Value,
    candidate_count: usize,
) -> Result<SearchResultRow, AppError> {
    Ok(sqlx::query_as::<_, SearchResultRow>(
        r#"
        INSERT INTO search_results (search_id, message, response, candidate_count)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(search_id)
    .bind(message)
    .bind(response)
    .bind(i32::try_from(candidate_count).unwrap_or(i32::MAX))
    .fetch_one(pool)
    .await?)
}

pub async fn list_searches(
    pool: &PgPool,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<Vec<SearchRow>, AppError> {
    get_project(pool, user_id, project_id).await?;
    Ok(sqlx::query_as::<_, SearchRow>(
        "SELECT * FROM searches WHERE project_id = $1 ORDER BY updated_at DESC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?)
}

/// Results of one search, oldest first, for a search the caller owns.
pub async fn get_results(
    pool: &PgPool,
    user_id: Uuid,
    search_id: Uuid,
) -> Result<Vec<SearchResultRow>, AppError> {
    let owned: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT s.id FROM searches s
        JOIN projects p ON p.id = s.project_id
        WHERE s.id = $1 AND p.user_id = $2
        "#,
    )
    .bind(search_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    if owned.is_none() {
        return Err(AppError::NotFound(format!("Search {search_id} not found")));
    }

    Ok(sqlx::query_as::<_, SearchResultRow>(
        "SELECT * FROM search_results WHERE search_id = $1 ORDER BY created_at ASC",
    )
    .bind(search_id)
    .fetch_all(pool)
    .await?)
}
