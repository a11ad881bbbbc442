//! Candidate records, keyed by the matching API's candidate id.
//!
//! Candidates are shared across projects; shortlisting and sequence
//! enrollment refer to them by the internal uuid.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::candidate::{CandidateDetailsRow, CandidateRow};

/// Stored for new candidates whose match result carries no name.
pub const UNNAMED_CANDIDATE: &str = "Unnamed candidate";

fn empty_array() -> Value {
    json!([])
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetailsInput {
    pub summary: Option<String>,
    #[serde(default = "empty_array")]
    pub employment_history: Value,
    #[serde(default = "empty_array")]
    pub education: Value,
    pub raw: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateInput {
    pub external_id: String,
    /// Missing names never replace a stored one.
    pub full_name: Option<String>,
    pub headline: Option<String>,
    pub current_title: Option<String>,
    pub current_company: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub linkedin_url: Option<String>,
    #[serde(default = "empty_array")]
    pub skills: Value,
    pub details: Option<DetailsInput>,
}

#[derive(Debug, Serialize)]
pub struct CandidateWithDetails {
    #[serde(flatten)]
    pub candidate: CandidateRow,
    pub details: Option<CandidateDetailsRow>,
}

fn text_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn array_field(value: &Value, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .find_map(|key| value.get(*key).filter(|v| v.is_array()).cloned())
}

impl CandidateInput {
    /// Builds a candidate from one element of the matching API's `candidates` array.
    pub fn from_match(value: &Value) -> Result<Self, AppError> {
        let external_id = text_field(value, &["id", "candidate_id", "profile_id"])
            .ok_or_else(|| AppError::Validation("candidate has no id".to_string()))?;
        let full_name = text_field(value, &["full_name", "name"]);

        let employment_history = array_field(value, &["employment_history", "experience"]);
        let education = array_field(value, &["education"]);
        let summary = text_field(value, &["summary", "about"]);
        let details = (summary.is_some() || employment_history.is_some() || education.is_some())
            .then(|| DetailsInput {
                summary,
                employment_history: employment_history.unwrap_or_else(empty_array),
                education: education.unwrap_or_else(empty_array),
                raw: Some(value.clone()),
            });

        Ok(CandidateInput {
            external_id,
            full_name,
            headline: text_field(value, &["headline"]),
            current_title: text_field(value, &["current_title", "title"]),
            current_company: text_field(value, &["current_company", "company"]),
            location: text_field(value, &["location"]),
            email: text_field(value, &["email"]),
            linkedin_url: text_field(value, &["linkedin_url", "linkedin"]),
            skills: array_field(value, &["skills"]).unwrap_or_else(empty_array),
            details,
        })
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.external_id.trim().is_empty() {
            return Err(AppError::Validation("external_id cannot be empty".to_string()));
        }
        if self.full_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AppError::Validation("full_name cannot be empty".to_string()));
        }
        if !self.skills.is_array() {
            return Err(AppError::Validation("skills must be an array".to_string()));
        }
        Ok(())
    }
}

/// Inserts or refreshes a candidate. Fields missing from `input` keep their stored value.
pub async fn upsert_candidate<'e>(
    executor: impl PgExecutor<'e>,
    input: &CandidateInput,
) -> Result<CandidateRow, AppError> {
    input.validate()?;
    Ok(sqlx::query_as::<_, CandidateRow>(
        r#"
        INSERT INTO candidates
            (external_id, full_name, headline, current_title, current_company,
             location, email, linkedin_url, skills)
        VALUES ($1, COALESCE($2, $10), $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (external_id) DO UPDATE SET
            full_name = COALESCE($2, candidates.full_name),
            headline = COALESCE(EXCLUDED.headline, candidates.headline),
            current_title = COALESCE(EXCLUDED.current_title, candidates.current_title),
            current_company = COALESCE(EXCLUDED.current_company, candidates.current_company),
            location = COALESCE(EXCLUDED.location, candidates.location),
            email = COALESCE(EXCLUDED.email, candidates.email),
            linkedin_url = COALESCE(EXCLUDED.linkedin_url, candidates.linkedin_url),
            skills = CASE WHEN EXCLUDED.skills = '[]'::jsonb
                          THEN candidates.skills ELSE EXCLUDED.skills END,
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(input.external_id.trim())
    .bind(input.full_name.as_deref().map(str::trim))
    .bind(&input.headline)
    .bind(&input.current_title)
    .bind(&input.current_company)
    .bind(&input.location)
    .bind(&input.email)
    .bind(&input.linkedin_url)
    .bind(&input.skills)
    .bind(UNNAMED_CANDIDATE)
    .fetch_one(executor)
    .await?)
}

pub async fn upsert_details<'e>(
    executor: impl PgExecutor<'e>,
    candidate_id: Uuid,
    details: &DetailsInput,
) -> Result<CandidateDetailsRow, AppError> {
    Ok(sqlx::query_as::<_, CandidateDetailsRow>(
        r#"
        INSERT INTO candidate_details (candidate_id, summary, employment_history, education, raw)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (candidate_id) DO UPDATE SET
            summary = COALESCE(EXCLUDED.summary, candidate_details.summary),
            employment_history = EXCLUDED.employment_history,
            education = EXCLUDED.education,
            raw = COALESCE(EXCLUDED.raw, candidate_details.raw),
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(candidate_id)
    .bind(&details.summary)
    .bind(&details.employment_history)
    .bind(&details.education)
    .bind(&details.raw)
    .fetch_one(executor)
    .await?)
}

pub async fn get_candidate(pool: &PgPool, candidate_id: Uuid) -> Result<CandidateWithDetails, AppError> {
    let candidate = sqlx::query_as::<_, CandidateRow>("SELECT * FROM candidates WHERE id = $1")
        .bind(candidate_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Candidate {candidate_id} not found")))?;

    let details = sqlx::query_as::<_, CandidateDetailsRow>(
        "SELECT * FROM candidate_details WHERE candidate_id = $1",
    )
    .bind(candidate_id)
    .fetch_optional(pool)
    .await?;

    Ok(CandidateWithDetails { candidate, details })
}

pub async fn candidate_exists(pool: &PgPool, candidate_id: Uuid) -> Result<bool, AppError> {
    Ok(
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM candidates WHERE id = $1)")
            .bind(candidate_id)
            .fetch_one(pool)
            .await?,
    )
}
