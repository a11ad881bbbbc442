//! Project shortlists and the denormalised `projects.shortlist_count` counter.
//!
//! The counter moves only when a shortlist row was actually inserted or
//! deleted, and it is updated best-effort after the row change commits: a
//! failed counter update is logged and the request still succeeds.
//! `recount` repairs drift.

use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::candidates::store::{upsert_candidate, upsert_details, CandidateInput};
use crate::errors::AppError;
use crate::models::candidate::{CandidateRow, ShortlistedCandidateRow};
use crate::models::project::ShortlistRow;
use crate::projects::store::get_project;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountDelta {
    Increment,
    Decrement,
}

impl CountDelta {
    fn sql(self) -> &'static str {
        match self {
            CountDelta::Increment => {
                "UPDATE projects SET shortlist_count = shortlist_count + 1, updated_at = now() \
                 WHERE id = $1 RETURNING shortlist_count"
            }
            CountDelta::Decrement => {
                "UPDATE projects SET shortlist_count = GREATEST(shortlist_count - 1, 0), updated_at = now() \
                 WHERE id = $1 RETURNING shortlist_count"
            }
        }
    }
}

/// Applies a counter delta locally; never goes below zero.
pub fn apply_delta(current: i32, delta: CountDelta) -> i32 {
    match delta {
        CountDelta::Increment => current.saturating_add(1),
        CountDelta::Decrement => current.saturating_sub(1).max(0),
    }
}

#[derive(Debug, Serialize)]
pub struct AddOutcome {
    /// False when the candidate was already on the shortlist.
    pub added: bool,
    pub entry: ShortlistRow,
    pub candidate: CandidateRow,
    pub shortlist_count: i32,
}

#[derive(Debug, Serialize)]
pub struct RemoveOutcome {
    pub removed: bool,
    pub shortlist_count: i32,
}

/// Moves the project's counter. On failure, logs and returns the local estimate.
async fn adjust_count(pool: &PgPool, project_id: Uuid, known: i32, delta: CountDelta) -> i32 {
    match sqlx::query_scalar::<_, i32>(delta.sql())
        .bind(project_id)
        .fetch_one(pool)
        .await
    {
        Ok(count) => count,
        Err(e) => {
            warn!("Failed to update shortlist_count for project {project_id}: {e}");
            apply_delta(known, delta)
        }
    }
}

pub async fn add_to_shortlist(
    pool: &PgPool,
    user_id: Uuid,
    project_id: Uuid,
    input: &CandidateInput,
    notes: Option<&str>,
) -> Result<AddOutcome, AppError> {
    let project = get_project(pool, user_id, project_id).await?;

    let mut tx = pool.begin().await?;
    let candidate = upsert_candidate(&mut *tx, input).await?;
    if let Some(details) = &input.details {
        upsert_details(&mut *tx, candidate.id, details).await?;
    }

    let inserted = sqlx::query_as::<_, ShortlistRow>(
        r#"
        INSERT INTO project_shortlist (project_id, candidate_id, notes, added_by)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (project_id, candidate_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(project_id)
    .bind(candidate.id)
    .bind(notes)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    let (added, entry) = match inserted {
        Some(entry) => (true, entry),
        None => {
            let existing = sqlx::query_as::<_, ShortlistRow>(
                "SELECT * FROM project_shortlist WHERE project_id = $1 AND candidate_id = $2",
            )
            .bind(project_id)
            .bind(candidate.id)
            .fetch_one(&mut *tx)
            .await?;
            (false, existing)
        }
    };
    tx.commit().await?;

    let shortlist_count = if added {
        info!(
            "Shortlisted candidate {} on project {project_id}",
            candidate.id
        );
        adjust_count(pool, project_id, project.shortlist_count, CountDelta::Increment).await
    } else {
        project.shortlist_count
    };

    Ok(AddOutcome {
        added,
        entry,
        candidate,
        shortlist_count,
    })
}

pub async fn remove_from_shortlist(
    pool: &PgPool,
    user_id: Uuid,
    project_id: Uuid,
    candidate_id: Uuid,
) -> Result<RemoveOutcome, AppError> {
    let project = get_project(pool, user_id, project_id).await?;

    let removed = sqlx::query(
        "DELETE FROM project_shortlist WHERE project_id = $1 AND candidate_id = $2",
    )
    .bind(project_id)
    .bind(candidate_id)
    .execute(pool)
    .await?
    .rows_affected()
        > 0;

    let shortlist_count = if removed {
        info!("Removed candidate {candidate_id} from project {project_id} shortlist");
        adjust_count(pool, project_id, project.shortlist_count, CountDelta::Decrement).await
    } else {
        project.shortlist_count
    };

    Ok(RemoveOutcome {
        removed,
        shortlist_count,
    })
}

pub async fn list_shortlist(
    pool: &PgPool,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<Vec<ShortlistedCandidateRow>, AppError> {
    get_project(pool, user_id, project_id).await?;
    Ok(sqlx::query_as::<_, ShortlistedCandidateRow>(
        r#"
        SELECT s.id AS shortlist_id, s.notes, s.created_at AS added_at,
               c.id AS candidate_id, c.external_id, c.full_name, c.headline,
               c.current_title, c.current_company, c.location, c.email,
               c.linkedin_url, c.skills
        FROM project_shortlist s
        JOIN candidates c ON c.id = s.candidate_id
        WHERE s.project_id = $1
        ORDER BY s.created_at DESC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?)
}

/// Resets `shortlist_count` to the number of shortlist rows.
pub async fn recount(pool: &PgPool, user_id: Uuid, project_id: Uuid) -> Result<i32, AppError> {
    get_project(pool, user_id, project_id).await?;
    let count: i32 = sqlx::query_scalar(
        r#"
        UPDATE projects
        SET shortlist_count = (SELECT COUNT(*) FROM project_shortlist WHERE project_id = $1)::int,
            updated_at = now()
        WHERE id = $1
        RETURNING shortlist_count
        "#,
    )
    .bind(project_id)
    .fetch_one(pool)
    .await?;
    info!("Recounted shortlist for project {project_id}: {count}");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_adds_exactly_one() {
        assert_eq!(apply_delta(0, CountDelta::Increment), 1);
        assert_eq!(apply_delta(41, CountDelta::Increment), 42);
    }

    #[test]
    fn test_decrement_never_below_zero() {
        assert_eq!(apply_delta(2, CountDelta::Decrement), 1);
        assert_eq!(apply_delta(1, CountDelta::Decrement), 0);
        assert_eq!(apply_delta(0, CountDelta::Decrement), 0);
        assert_eq!(apply_delta(-3, CountDelta::Decrement), 0);
    }

    #[test]
    fn test_add_then_remove_restores_count() {
        let after = apply_delta(apply_delta(5, CountDelta::Increment), CountDelta::Decrement);
        assert_eq!(after, 5);
    }

    #[test]
    fn test_decrement_sql_is_floored() {
        assert!(CountDelta::Decrement.sql().contains("GREATEST(shortlist_count - 1, 0)"));
        assert!(CountDelta::Increment.sql().contains("shortlist_count + 1"));
    }
}
