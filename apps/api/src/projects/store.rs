use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::project::ProjectRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub query: Option<String>,
    pub status: Option<ProjectStatus>,
}

/// Child rows removed before the project itself, leaves first.
/// Each statement takes the project id as `$1`.
pub const PROJECT_CASCADE: &[(&str, &str)] = &[
    (
        "search_results",
        "DELETE FROM search_results WHERE search_id IN (SELECT id FROM searches WHERE project_id = $1)",
    ),
    ("searches", "DELETE FROM searches WHERE project_id = $1"),
    (
        "project_shortlist",
        "DELETE FROM project_shortlist WHERE project_id = $1",
    ),
    (
        "email_logs",
        "DELETE FROM email_logs WHERE sequence_id IN (SELECT id FROM email_sequences WHERE project_id = $1)",
    ),
    (
        "sequence_recipients",
        "DELETE FROM sequence_recipients WHERE sequence_id IN (SELECT id FROM email_sequences WHERE project_id = $1)",
    ),
    (
        "email_templates",
        "DELETE FROM email_templates WHERE sequence_id IN (SELECT id FROM email_sequences WHERE project_id = $1)",
    ),
    (
        "email_sequences",
        "DELETE FROM email_sequences WHERE project_id = $1",
    ),
];

fn required_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    Ok(name.to_string())
}

pub async fn create_project(
    pool: &PgPool,
    user_id: Uuid,
    new: &NewProject,
) -> Result<ProjectRow, AppError> {
    let name = required_name(&new.name)?;
    let project = sqlx::query_as::<_, ProjectRow>(
        r#"
        INSERT INTO projects (user_id, name, description, query)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(&name)
    .bind(&new.description)
    .bind(&new.query)
    .fetch_one(pool)
    .await?;

    info!("Created project {} for user {user_id}", project.id);
    Ok(project)
}

pub async fn list_projects(pool: &PgPool, user_id: Uuid) -> Result<Vec<ProjectRow>, AppError> {
    Ok(sqlx::query_as::<_, ProjectRow>(
        "SELECT * FROM projects WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}

/// Loads a project owned by `user_id`. Projects of other users are reported as missing.
pub async fn get_project(
    pool: &PgPool,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<ProjectRow, AppError> {
    sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects WHERE id = $1 AND user_id = $2")
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {project_id} not found")))
}

pub async fn update_project(
    pool: &PgPool,
    user_id: Uuid,
    project_id: Uuid,
    patch: &ProjectPatch,
) -> Result<ProjectRow, AppError> {
    let name = patch.name.as_deref().map(required_name).transpose()?;
    sqlx::query_as::<_, ProjectRow>(
        r#"
        UPDATE projects
        SET name = COALESCE($3, name),
            description = COALESCE($4, description),
            query = COALESCE($5, query),
            status = COALESCE($6, status),
            updated_at = now()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(project_id)
    .bind(user_id)
    .bind(name)
    .bind(&patch.description)
    .bind(&patch.query)
    .bind(patch.status.map(ProjectStatus::as_str))
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Project {project_id} not found")))
}

/// Deletes a project and everything hanging off it in one transaction.
pub async fn delete_project(pool: &PgPool, user_id: Uuid, project_id: Uuid) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    let owned: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM projects WHERE id = $1 AND user_id = $2 FOR UPDATE")
            .bind(project_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
    if owned.is_none() {
        return Err(AppError::NotFound(format!("Project {project_id} not found")));
    }

    for (table, statement) in PROJECT_CASCADE {
        let removed = sqlx::query(statement)
            .bind(project_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed > 0 {
            info!("Deleted {removed} {table} rows for project {project_id}");
        }
    }

    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!("Deleted project {project_id}");
    Ok(())
}
