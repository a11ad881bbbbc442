use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::sequence::{EmailLogRow, EmailTemplateRow, RecipientRow, SequenceRow};
use crate::models::template::{GlobalTemplateEmailRow, GlobalTemplateRow};
use crate::projects::store::get_project;
use crate::sequences::schedule::{Schedule, ScheduleConfig, ScheduleType};

/// Engagement reported for a recipient by the mail provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecipientEvent {
    Opened,
    Clicked,
    Replied,
    Bounced,
    Unsubscribed,
}

impl RecipientEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            RecipientEvent::Opened => "opened",
            RecipientEvent::Clicked => "clicked",
            RecipientEvent::Replied => "replied",
            RecipientEvent::Bounced => "bounced",
            RecipientEvent::Unsubscribed => "unsubscribed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "opened" => Some(RecipientEvent::Opened),
            "clicked" => Some(RecipientEvent::Clicked),
            "replied" => Some(RecipientEvent::Replied),
            "bounced" => Some(RecipientEvent::Bounced),
            "unsubscribed" => Some(RecipientEvent::Unsubscribed),
            _ => None,
        }
    }

    /// Events after which no further email is sent to the recipient.
    pub fn stops_sequence(self) -> bool {
        matches!(
            self,
            RecipientEvent::Replied | RecipientEvent::Bounced | RecipientEvent::Unsubscribed
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStatus {
    Active,
    Paused,
    Archived,
}

impl SequenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SequenceStatus::Active => "active",
            SequenceStatus::Paused => "paused",
            SequenceStatus::Archived => "archived",
        }
    }
}

/// One email of a sequence or global template, as submitted by the editor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailInput {
    pub subject: String,
    pub body: String,
}

pub fn validate_emails(emails: &[EmailInput]) -> Result<(), AppError> {
    if emails.is_empty() {
        return Err(AppError::Validation(
            "at least one email is required".to_string(),
        ));
    }
    for (i, email) in emails.iter().enumerate() {
        if email.subject.trim().is_empty() || email.body.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "email {} needs a subject and a body",
                i + 1
            )));
        }
    }
    Ok(())
}

fn default_schedule_type() -> ScheduleType {
    ScheduleType::Delay
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSequence {
    pub project_id: Option<Uuid>,
    pub name: String,
    #[serde(default = "default_schedule_type")]
    pub schedule_type: ScheduleType,
    #[serde(default)]
    pub schedule_config: ScheduleConfig,
    pub emails: Vec<EmailInput>,
}

impl NewSequence {
    pub fn schedule(&self) -> Schedule {
        Schedule {
            schedule_type: self.schedule_type,
            schedule_config: self.schedule_config.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FromTemplateRequest {
    pub global_template_id: Uuid,
    pub project_id: Option<Uuid>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrollRequest {
    #[serde(default)]
    pub candidate_ids: Vec<Uuid>,
    /// Also enroll everyone on the sequence's project shortlist.
    #[serde(default)]
    pub from_shortlist: bool,
}

#[derive(Debug, Serialize)]
pub struct EnrollOutcome {
    pub enrolled: u64,
}

#[derive(Debug, Serialize)]
pub struct SequenceDetail {
    #[serde(flatten)]
    pub sequence: SequenceRow,
    pub templates: Vec<EmailTemplateRow>,
    pub recipient_counts: BTreeMap<String, i64>,
}

/// A template email copied into a sequence, keeping its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailCopy {
    pub subject: String,
    pub body: String,
    pub order_index: i32,
}

/// Copies global template emails in `order_index` order, preserving each index.
pub fn plan_template_copy(emails: &[GlobalTemplateEmailRow]) -> Vec<EmailCopy> {
    let mut copies: Vec<EmailCopy> = emails
        .iter()
        .map(|e| EmailCopy {
            subject: e.subject.clone(),
            body: e.body.clone(),
            order_index: e.order_index,
        })
        .collect();
    copies.sort_by_key(|c| c.order_index);
    copies
}

fn required_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    Ok(name.to_string())
}

async fn insert_email(
    tx: &mut Transaction<'_, Postgres>,
    sequence_id: Uuid,
    subject: &str,
    body: &str,
    order_index: i32,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO email_templates (sequence_id, subject, body, order_index) VALUES ($1, $2, $3, $4)",
    )
    .bind(sequence_id)
    .bind(subject)
    .bind(body)
    .bind(order_index)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_sequence(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    project_id: Option<Uuid>,
    name: &str,
    schedule: &Schedule,
    global_template_id: Option<Uuid>,
) -> Result<SequenceRow, AppError> {
    Ok(sqlx::query_as::<_, SequenceRow>(
        r#"
        INSERT INTO email_sequences
            (user_id, project_id, name, schedule_type, schedule_config, global_template_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(project_id)
    .bind(name)
    .bind(schedule.schedule_type.as_str())
    .bind(schedule.config_json())
    .bind(global_template_id)
    .fetch_one(&mut **tx)
    .await?)
}

pub async fn create_sequence(
    pool: &PgPool,
    user_id: Uuid,
    new: &NewSequence,
) -> Result<SequenceDetail, AppError> {
    let name = required_name(&new.name)?;
    let schedule = new.schedule();
    schedule.validate()?;
    validate_emails(&new.emails)?;
    if let Some(project_id) = new.project_id {
        get_project(pool, user_id, project_id).await?;
    }

    let mut tx = pool.begin().await?;
    let sequence = insert_sequence(&mut tx, user_id, new.project_id, &name, &schedule, None).await?;
    for (index, email) in new.emails.iter().enumerate() {
        let order_index = i32::try_from(index)
            .map_err(|_| AppError::Validation("too many emails".to_string()))?;
        insert_email(&mut tx, sequence.id, email.subject.trim(), &email.body, order_index).await?;
    }
    tx.commit().await?;

    info!(
        "Created sequence {} with {} emails",
        sequence.id,
        new.emails.len()
    );
    get_sequence(pool, user_id, sequence.id).await
}

/// Clones a global template into a new sequence, emails and schedule included.
pub async fn create_from_template(
    pool: &PgPool,
    user_id: Uuid,
    req: &FromTemplateRequest,
) -> Result<SequenceDetail, AppError> {
    if let Some(project_id) = req.project_id {
        get_project(pool, user_id, project_id).await?;
    }

    let mut tx = pool.begin().await?;
    let template = sqlx::query_as::<_, GlobalTemplateRow>(
        "SELECT * FROM global_templates WHERE id = $1 AND user_id = $2 FOR SHARE",
    )
    .bind(req.global_template_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| {
        AppError::NotFound(format!(
            "Global template {} not found",
            req.global_template_id
        ))
    })?;

    let emails = sqlx::query_as::<_, GlobalTemplateEmailRow>(
        "SELECT * FROM global_template_emails WHERE global_template_id = $1 ORDER BY order_index ASC",
    )
    .bind(template.id)
    .fetch_all(&mut *tx)
    .await?;

    let schedule = Schedule::from_row(&template.schedule_type, &template.schedule_config)?;
    let name = match req.name.as_deref() {
        Some(name) => required_name(name)?,
        None => template.name.clone(),
    };

    let sequence = insert_sequence(
        &mut tx,
        user_id,
        req.project_id,
        &name,
        &schedule,
        Some(template.id),
    )
    .await?;
    let copies = plan_template_copy(&emails);
    for copy in &copies {
        insert_email(&mut tx, sequence.id, &copy.subject, &copy.body, copy.order_index).await?;
    }
    tx.commit().await?;

    info!(
        "Created sequence {} from global template {} ({} emails copied)",
        sequence.id,
        template.id,
        copies.len()
    );
    get_sequence(pool, user_id, sequence.id).await
}

pub async fn load_owned_sequence(
    pool: &PgPool,
    user_id: Uuid,
    sequence_id: Uuid,
) -> Result<SequenceRow, AppError> {
    sqlx::query_as::<_, SequenceRow>(
        "SELECT * FROM email_sequences WHERE id = $1 AND user_id = $2",
    )
    .bind(sequence_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Sequence {sequence_id} not found")))
}

pub async fn list_sequences(
    pool: &PgPool,
    user_id: Uuid,
    project_id: Option<Uuid>,
) -> Result<Vec<SequenceRow>, AppError> {
    Ok(sqlx::query_as::<_, SequenceRow>(
        r#"
        SELECT * FROM email_sequences
        WHERE user_id = $1 AND ($2::uuid IS NULL OR project_id = $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(project_id)
    .fetch_all(pool)
    .await?)
}

pub async fn get_sequence(
    pool: &PgPool,
    user_id: Uuid,
    sequence_id: Uuid,
) -> Result<SequenceDetail, AppError> {
    let sequence = load_owned_sequence(pool, user_id, sequence_id).await?;

    let templates = sqlx::query_as::<_, EmailTemplateRow>(
        "SELECT * FROM email_templates WHERE sequence_id = $1 ORDER BY order_index ASC",
    )
    .bind(sequence_id)
    .fetch_all(pool)
    .await?;

    let counts: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM sequence_recipients WHERE sequence_id = $1 GROUP BY status",
    )
    .bind(sequence_id)
    .fetch_all(pool)
    .await?;

    Ok(SequenceDetail {
        sequence,
        templates,
        recipient_counts: counts.into_iter().collect(),
    })
}

pub async fn update_status(
    pool: &PgPool,
    user_id: Uuid,
    sequence_id: Uuid,
    status: SequenceStatus,
) -> Result<SequenceRow, AppError> {
    let sequence = sqlx::query_as::<_, SequenceRow>(
        r#"
        UPDATE email_sequences SET status = $3, updated_at = now()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(sequence_id)
    .bind(user_id)
    .bind(status.as_str())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Sequence {sequence_id} not found")))?;
    info!("Sequence {sequence_id} is now {}", status.as_str());
    Ok(sequence)
}

pub async fn delete_sequence(pool: &PgPool, user_id: Uuid, sequence_id: Uuid) -> Result<(), AppError> {
    let removed = sqlx::query("DELETE FROM email_sequences WHERE id = $1 AND user_id = $2")
        .bind(sequence_id)
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected();
    if removed == 0 {
        return Err(AppError::NotFound(format!("Sequence {sequence_id} not found")));
    }
    info!("Deleted sequence {sequence_id}");
    Ok(())
}

/// Enrolls candidates; already-enrolled candidates and unknown ids are ignored.
pub async fn enroll_recipients(
    pool: &PgPool,
    user_id: Uuid,
    sequence_id: Uuid,
    req: &EnrollRequest,
) -> Result<EnrollOutcome, AppError> {
    let sequence = load_owned_sequence(pool, user_id, sequence_id).await?;
    let shortlist_project = match (req.from_shortlist, sequence.project_id) {
        (true, Some(project_id)) => Some(project_id),
        (true, None) => {
            return Err(AppError::Validation(
                "from_shortlist requires a project sequence".to_string(),
            ))
        }
        (false, _) => None,
    };
    if req.candidate_ids.is_empty() && shortlist_project.is_none() {
        return Err(AppError::Validation(
            "candidate_ids cannot be empty".to_string(),
        ));
    }

    let schedule = Schedule::from_row(&sequence.schedule_type, &sequence.schedule_config)?;
    let first_send_at = schedule.first_send_at(Utc::now());

    let enrolled = sqlx::query(
        r#"
        INSERT INTO sequence_recipients (sequence_id, candidate_id, next_send_at)
        SELECT $1, c.id, $3
        FROM candidates c
        WHERE c.id = ANY($2)
           OR c.id IN (SELECT candidate_id FROM project_shortlist WHERE project_id = $4)
        ON CONFLICT (sequence_id, candidate_id) DO NOTHING
        "#,
    )
    .bind(sequence_id)
    .bind(&req.candidate_ids)
    .bind(first_send_at)
    .bind(shortlist_project)
    .execute(pool)
    .await?
    .rows_affected();

    info!("Enrolled {enrolled} recipients in sequence {sequence_id}");
    Ok(EnrollOutcome { enrolled })
}

pub async fn list_recipients(
    pool: &PgPool,
    user_id: Uuid,
    sequence_id: Uuid,
) -> Result<Vec<RecipientRow>, AppError> {
    load_owned_sequence(pool, user_id, sequence_id).await?;
    Ok(sqlx::query_as::<_, RecipientRow>(
        "SELECT * FROM sequence_recipients WHERE sequence_id = $1 ORDER BY created_at ASC",
    )
    .bind(sequence_id)
    .fetch_all(pool)
    .await?)
}

pub async fn remove_recipient(
    pool: &PgPool,
    user_id: Uuid,
    sequence_id: Uuid,
    recipient_id: Uuid,
) -> Result<(), AppError> {
    load_owned_sequence(pool, user_id, sequence_id).await?;
    let removed =
        sqlx::query("DELETE FROM sequence_recipients WHERE id = $1 AND sequence_id = $2")
            .bind(recipient_id)
            .bind(sequence_id)
            .execute(pool)
            .await?
            .rows_affected();
    if removed == 0 {
        return Err(AppError::NotFound(format!(
            "Recipient {recipient_id} not found"
        )));
    }
    Ok(())
}

pub async fn list_logs(
    pool: &PgPool,
    user_id: Uuid,
    sequence_id: Uuid,
) -> Result<Vec<EmailLogRow>, AppError> {
    load_owned_sequence(pool, user_id, sequence_id).await?;
    Ok(sqlx::query_as::<_, EmailLogRow>(
        "SELECT * FROM email_logs WHERE sequence_id = $1 ORDER BY created_at DESC",
    )
    .bind(sequence_id)
    .fetch_all(pool)
    .await?)
}

/// Records engagement on a recipient's latest email.
///
/// Stop events end the recipient's sequence. Other events only count while
/// the recipient is still active.
pub async fn record_event(
    pool: &PgPool,
    user_id: Uuid,
    recipient_id: Uuid,
    event: RecipientEvent,
) -> Result<RecipientRow, AppError> {
    let mut tx = pool.begin().await?;

    let recipient = sqlx::query_as::<_, RecipientRow>(
        r#"
        UPDATE sequence_recipients r
        SET last_event = CASE WHEN r.status = 'active' OR $3 THEN $2 ELSE r.last_event END,
            status = CASE WHEN $3 THEN $2 ELSE r.status END,
            next_send_at = CASE WHEN $3 THEN NULL ELSE r.next_send_at END,
            updated_at = now()
        FROM email_sequences s
        WHERE r.id = $1 AND s.id = r.sequence_id AND s.user_id = $4
        RETURNING r.*
        "#,
    )
    .bind(recipient_id)
    .bind(event.as_str())
    .bind(event.stops_sequence())
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Recipient {recipient_id} not found")))?;

    sqlx::query(
        r#"
        UPDATE email_logs SET status = $2
        WHERE id = (
            SELECT id FROM email_logs
            WHERE recipient_id = $1 AND status NOT IN ('skipped', 'failed')
            ORDER BY created_at DESC
            LIMIT 1
        )
        "#,
    )
    .bind(recipient_id)
    .bind(event.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!("Recorded {} for recipient {recipient_id}", event.as_str());
    Ok(recipient)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template_email(order_index: i32, subject: &str) -> GlobalTemplateEmailRow {
        GlobalTemplateEmailRow {
            id: Uuid::new_v4(),
            global_template_id: Uuid::nil(),
            subject: subject.to_string(),
            body: format!("Body of {subject}"),
            order_index,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_template_copy_preserves_every_order_index() {
        let emails = vec![
            template_email(2, "Last nudge"),
            template_email(0, "Intro"),
            template_email(1, "Follow-up"),
        ];
        let copies = plan_template_copy(&emails);
        assert_eq!(copies.len(), emails.len());
        assert_eq!(
            copies
                .iter()
                .map(|c| (c.order_index, c.subject.as_str()))
                .collect::<Vec<_>>(),
            vec![(0, "Intro"), (1, "Follow-up"), (2, "Last nudge")]
        );
        assert_eq!(copies[0].body, "Body of Intro");
    }

    #[test]
    fn test_template_copy_keeps_gaps_in_indices() {
        let emails = vec![template_email(0, "a"), template_email(5, "b")];
        let indices: Vec<i32> = plan_template_copy(&emails)
            .iter()
            .map(|c| c.order_index)
            .collect();
        assert_eq!(indices, vec![0, 5]);
    }

    #[test]
    fn test_validate_emails() {
        assert!(validate_emails(&[]).is_err());
        assert!(validate_emails(&[EmailInput {
            subject: "Hi".to_string(),
            body: " ".to_string(),
        }])
        .is_err());
        assert!(validate_emails(&[EmailInput {
            subject: "Hi".to_string(),
            body: "Hello {{first_name}}".to_string(),
        }])
        .is_ok());
    }

    #[test]
    fn test_recipient_event_round_trip() {
        for event in [
            RecipientEvent::Opened,
            RecipientEvent::Clicked,
            RecipientEvent::Replied,
            RecipientEvent::Bounced,
            RecipientEvent::Unsubscribed,
        ] {
            assert_eq!(RecipientEvent::parse(event.as_str()), Some(event));
        }
        assert_eq!(RecipientEvent::parse("delivered"), None);
    }

    #[test]
    fn test_stop_events() {
        assert!(RecipientEvent::Replied.stops_sequence());
        assert!(RecipientEvent::Bounced.stops_sequence());
        assert!(RecipientEvent::Unsubscribed.stops_sequence());
        assert!(!RecipientEvent::Opened.stops_sequence());
        assert!(!RecipientEvent::Clicked.stops_sequence());
    }

    #[test]
    fn test_new_sequence_defaults_to_delay_schedule() {
        let new: NewSequence = serde_json::from_value(serde_json::json!({
            "name": "Backend outreach",
            "emails": [{"subject": "Hi", "body": "Hello"}]
        }))
        .unwrap();
        let schedule = new.schedule();
        assert_eq!(schedule.schedule_type, ScheduleType::Delay);
        assert!(schedule.validate().is_ok());
        assert!(new.project_id.is_none());
    }
}
