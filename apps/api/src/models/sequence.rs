use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SequenceRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub project_id: Option<Uuid>,
    pub name: String,
    pub status: String,
    pub schedule_type: String,
    pub schedule_config: Value,
    pub global_template_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailTemplateRow {
    pub id: Uuid,
    pub sequence_id: Uuid,
    pub subject: String,
    pub body: String,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipientRow {
    pub id: Uuid,
    pub sequence_id: Uuid,
    pub candidate_id: Uuid,
    pub status: String,
    pub current_template_index: i32,
    pub next_send_at: Option<DateTime<Utc>>,
    pub last_event: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailLogRow {
    pub id: Uuid,
    pub sequence_id: Uuid,
    pub recipient_id: Uuid,
    pub template_id: Option<Uuid>,
    pub order_index: i32,
    pub status: String,
    pub subject: String,
    pub body: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}
