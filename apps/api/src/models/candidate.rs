use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateRow {
    pub id: Uuid,
    pub external_id: String,
    pub full_name: String,
    pub headline: Option<String>,
    pub current_title: Option<String>,
    pub current_company: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub linkedin_url: Option<String>,
    pub skills: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateDetailsRow {
    pub candidate_id: Uuid,
    pub summary: Option<String>,
    pub employment_history: Value,
    pub education: Value,
    pub raw: Option<Value>,
    pub updated_at: DateTime<Utc>,
}

/// A shortlist entry joined with its candidate, as listed on the shortlist page.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShortlistedCandidateRow {
    pub shortlist_id: Uuid,
    pub notes: Option<String>,
    pub added_at: DateTime<Utc>,
    pub candidate_id: Uuid,
    pub external_id: String,
    pub full_name: String,
    pub headline: Option<String>,
    pub current_title: Option<String>,
    pub current_company: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub linkedin_url: Option<String>,
    pub skills: Value,
}
