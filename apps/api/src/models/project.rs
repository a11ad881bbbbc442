use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProjectRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub query: Option<String>,
    pub status: String,
    pub shortlist_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShortlistRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub candidate_id: Uuid,
    pub notes: Option<String>,
    pub added_by: Uuid,
    pub created_at: DateTime<Utc>,
}
