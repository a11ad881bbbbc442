use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::template::{GlobalTemplateEmailRow, GlobalTemplateRow};
use crate::sequences::schedule::{Schedule, ScheduleConfig, ScheduleType};
use crate::sequences::store::{validate_emails, EmailInput};

fn default_schedule_type() -> ScheduleType {
    ScheduleType::Delay
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewGlobalTemplate {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_schedule_type")]
    pub schedule_type: ScheduleType,
    #[serde(default)]
    pub schedule_config: ScheduleConfig,
    pub emails: Vec<EmailInput>,
}

/// Partial update. `emails`, when present, replaces the whole email list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalTemplatePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub schedule_type: Option<ScheduleType>,
    pub schedule_config: Option<ScheduleConfig>,
    pub emails: Option<Vec<EmailInput>>,
}

impl GlobalTemplatePatch {
    /// Merges the patch's schedule fields over the stored schedule.
    pub fn merged_schedule(&self, current: &Schedule) -> Schedule {
        Schedule {
            schedule_type: self.schedule_type.unwrap_or(current.schedule_type),
            schedule_config: self
                .schedule_config
                .clone()
                .unwrap_or_else(|| current.schedule_config.clone()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GlobalTemplateDetail {
    #[serde(flatten)]
    pub template: GlobalTemplateRow,
    pub emails: Vec<GlobalTemplateEmailRow>,
}

fn required_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    Ok(name.to_string())
}

async fn replace_emails(
    tx: &mut Transaction<'_, Postgres>,
    template_id: Uuid,
    emails: &[EmailInput],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM global_template_emails WHERE global_template_id = $1")
        .bind(template_id)
        .execute(&mut **tx)
        .await?;
    for (index, email) in emails.iter().enumerate() {
        let order_index = i32::try_from(index)
            .map_err(|_| AppError::Validation("too many emails".to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO global_template_emails (global_template_id, subject, body, order_index)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(template_id)
        .bind(email.subject.trim())
        .bind(&email.body)
        .bind(order_index)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

pub async fn create_template(
    pool: &PgPool,
    user_id: Uuid,
    new: &NewGlobalTemplate,
) -> Result<GlobalTemplateDetail, AppError> {
    let name = required_name(&new.name)?;
    let schedule = Schedule {
        schedule_type: new.schedule_type,
        schedule_config: new.schedule_config.clone(),
    };
    schedule.validate()?;
    validate_emails(&new.emails)?;

    let mut tx = pool.begin().await?;
    let template = sqlx::query_as::<_, GlobalTemplateRow>(
        r#"
        INSERT INTO global_templates (user_id, name, description, schedule_type, schedule_config)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(&name)
    .bind(&new.description)
    .bind(schedule.schedule_type.as_str())
    .bind(schedule.config_json())
    .fetch_one(&mut *tx)
    .await?;
    replace_emails(&mut tx, template.id, &new.emails).await?;
    tx.commit().await?;

    info!(
        "Created global template {} with {} emails",
        template.id,
        new.emails.len()
    );
    get_template(pool, user_id, template.id).await
}

pub async fn list_templates(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<GlobalTemplateRow>, AppError> {
    Ok(sqlx::query_as::<_, GlobalTemplateRow>(
        "SELECT * FROM global_templates WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}

pub async fn get_template(
    pool: &PgPool,
    user_id: Uuid,
    template_id: Uuid,
) -> Result<GlobalTemplateDetail, AppError> {
    let template = sqlx::query_as::<_, GlobalTemplateRow>(
        "SELECT * FROM global_templates WHERE id = $1 AND user_id = $2",
    )
    .bind(template_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Global template {template_id} not found")))?;

    let emails = sqlx::query_as::<_, GlobalTemplateEmailRow>(
        "SELECT * FROM global_template_emails WHERE global_template_id = $1 ORDER BY order_index ASC",
    )
    .bind(template_id)
    .fetch_all(pool)
    .await?;

    Ok(GlobalTemplateDetail { template, emails })
}

/// Sequences already cloned from the template keep their own copies.
pub async fn update_template(
    pool: &PgPool,
    user_id: Uuid,
    template_id: Uuid,
    patch: &GlobalTemplatePatch,
) -> Result<GlobalTemplateDetail, AppError> {
    let name = patch.name.as_deref().map(required_name).transpose()?;
    if let Some(emails) = &patch.emails {
        validate_emails(emails)?;
    }

    let mut tx = pool.begin().await?;
    let current = sqlx::query_as::<_, GlobalTemplateRow>(
        "SELECT * FROM global_templates WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(template_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Global template {template_id} not found")))?;

    let schedule = patch.merged_schedule(&Schedule::from_row(
        &current.schedule_type,
        &current.schedule_config,
    )?);
    schedule.validate()?;

    sqlx::query(
        r#"
        UPDATE global_templates
        SET name = COALESCE($2, name),
            description = COALESCE($3, description),
            schedule_type = $4,
            schedule_config = $5,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(template_id)
    .bind(name)
    .bind(&patch.description)
    .bind(schedule.schedule_type.as_str())
    .bind(schedule.config_json())
    .execute(&mut *tx)
    .await?;

    if let Some(emails) = &patch.emails {
        replace_emails(&mut tx, template_id, emails).await?;
    }
    tx.commit().await?;

    info!("Updated global template {template_id}");
    get_template(pool, user_id, template_id).await
}

pub async fn delete_template(
    pool: &PgPool,
    user_id: Uuid,
    template_id: Uuid,
) -> Result<(), AppError> {
    let removed = sqlx::query("DELETE FROM global_templates WHERE id = $1 AND user_id = $2")
        .bind(template_id)
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected();
    if removed == 0 {
        return Err(AppError::NotFound(format!(
            "Global template {template_id} not found"
        )));
    }
    info!("Deleted global template {template_id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patch_without_schedule_keeps_current() {
        let current = Schedule {
            schedule_type: ScheduleType::Immediate,
            schedule_config: ScheduleConfig {
                skip_weekends: true,
                ..ScheduleConfig::default()
            },
        };
        let patch = GlobalTemplatePatch {
            name: Some("Renamed".to_string()),
            ..GlobalTemplatePatch::default()
        };
        assert_eq!(patch.merged_schedule(&current), current);
    }

    #[test]
    fn test_patch_schedule_type_overrides_only_type() {
        let current = Schedule::default();
        let patch: GlobalTemplatePatch =
            serde_json::from_value(json!({"schedule_type": "immediate"})).unwrap();
        let merged = patch.merged_schedule(&current);
        assert_eq!(merged.schedule_type, ScheduleType::Immediate);
        assert_eq!(merged.schedule_config, current.schedule_config);
    }

    #[test]
    fn test_new_template_requires_emails_field() {
        let parsed = serde_json::from_value::<NewGlobalTemplate>(json!({"name": "Cold intro"}));
        assert!(parsed.is_err());
    }
}
