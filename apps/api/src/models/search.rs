use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SearchRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub session_id: String,
    pub query: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SearchResultRow {
    pub id: Uuid,
    pub search_id: Uuid,
    pub message: String,
    pub response: Value,
    pub candidate_count: i32,
    pub created_at: DateTime<Utc>,
}
