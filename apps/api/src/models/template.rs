use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GlobalTemplateRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub schedule_type: String,
    pub schedule_config: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GlobalTemplateEmailRow {
    pub id: Uuid,
    pub global_template_id: Uuid,
    pub subject: String,
    pub body: String,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
}
