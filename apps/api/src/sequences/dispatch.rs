//! Sequence dispatcher.
//!
//! Flow: lock due recipients → plan each step → render the email → push it
//! onto the outbound queue → log it → advance the recipient.
//!
//! Runs on an interval in the background and on demand through
//! `POST /api/v1/sequences/dispatch`. Rows are claimed with
//! `FOR UPDATE SKIP LOCKED`, so concurrent runs never double-send a step.
//! The queue push happens before commit: a failed commit can repeat an
//! email, never lose one.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::profile::ProfileRow;
use crate::models::sequence::EmailTemplateRow;
use crate::sequences::outbound::{OutboundEmail, OutboundQueue};
use crate::sequences::render::{render, TemplateVars};
use crate::sequences::schedule::{Schedule, TriggerCondition};
use crate::sequences::store::RecipientEvent;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDecision {
    /// Send email `index`; the recipient moves on to `next_index`.
    Send {
        index: usize,
        next_index: usize,
        next_send_at: Option<DateTime<Utc>>,
    },
    /// Trigger not met: advance past email `index` without sending it.
    Skip {
        index: usize,
        next_index: usize,
        next_send_at: Option<DateTime<Utc>>,
    },
    /// Every email has been handled.
    Complete,
    /// The candidate replied, bounced or unsubscribed.
    Halt(RecipientEvent),
}

/// Decides what happens to a due recipient at `now`.
pub fn plan_step(
    current_index: usize,
    template_count: usize,
    last_event: Option<RecipientEvent>,
    schedule: &Schedule,
    now: DateTime<Utc>,
) -> StepDecision {
    if current_index >= template_count {
        return StepDecision::Complete;
    }
    if let Some(event) = last_event.filter(|e| e.stops_sequence()) {
        return StepDecision::Halt(event);
    }

    let next_index = current_index + 1;
    let next_send_at =
        (next_index < template_count).then(|| schedule.next_send_at(now, next_index));
    let engaged = matches!(
        last_event,
        Some(RecipientEvent::Opened | RecipientEvent::Clicked)
    );

    // The first email always goes out; triggers gate follow-ups only.
    let send = current_index == 0
        || match schedule.trigger_condition() {
            None | Some(TriggerCondition::NoReply) => true,
            Some(TriggerCondition::Opened) => engaged,
            Some(TriggerCondition::NotOpened) => !engaged,
        };

    if send {
        StepDecision::Send {
            index: current_index,
            next_index,
            next_send_at,
        }
    } else {
        StepDecision::Skip {
            index: current_index,
            next_index,
            next_send_at,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct DispatchReport {
    pub examined: usize,
    pub sent: usize,
    pub skipped: usize,
    pub completed: usize,
    pub halted: usize,
    pub failed: usize,
}

#[derive(Debug, FromRow)]
struct DueRecipient {
    id: Uuid,
    sequence_id: Uuid,
    candidate_id: Uuid,
    current_template_index: i32,
    last_event: Option<String>,
    user_id: Uuid,
    schedule_type: String,
    schedule_config: Value,
    full_name: String,
    email: Option<String>,
    current_company: Option<String>,
    current_title: Option<String>,
}

async fn finish_recipient(
    tx: &mut Transaction<'_, Postgres>,
    recipient_id: Uuid,
    status: &str,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE sequence_recipients SET status = $2, next_send_at = NULL, updated_at = now() WHERE id = $1",
    )
    .bind(recipient_id)
    .bind(status)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn advance_recipient(
    tx: &mut Transaction<'_, Postgres>,
    recipient_id: Uuid,
    next_index: usize,
    next_send_at: Option<DateTime<Utc>>,
    clear_event: bool,
) -> Result<(), AppError> {
    let status = if next_send_at.is_some() {
        "active"
    } else {
        "completed"
    };
    sqlx::query(
        r#"
        UPDATE sequence_recipients
        SET current_template_index = $2,
            next_send_at = $3,
            status = $4,
            last_event = CASE WHEN $5 THEN NULL ELSE last_event END,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(recipient_id)
    .bind(i32::try_from(next_index).unwrap_or(i32::MAX))
    .bind(next_send_at)
    .bind(status)
    .bind(clear_event)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_log(
    tx: &mut Transaction<'_, Postgres>,
    recipient: &DueRecipient,
    template: &EmailTemplateRow,
    status: &str,
    subject: &str,
    body: &str,
    error: Option<&str>,
) -> Result<Uuid, AppError> {
    Ok(sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO email_logs
            (sequence_id, recipient_id, template_id, order_index, status, subject, body, error)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(recipient.sequence_id)
    .bind(recipient.id)
    .bind(template.id)
    .bind(template.order_index)
    .bind(status)
    .bind(subject)
    .bind(body)
    .bind(error)
    .fetch_one(&mut **tx)
    .await?)
}

/// Processes up to `batch_size` due recipients.
pub async fn dispatch_due(
    pool: &PgPool,
    queue: &OutboundQueue,
    now: DateTime<Utc>,
    batch_size: i64,
) -> Result<DispatchReport, AppError> {
    let mut report = DispatchReport::default();
    let mut tx = pool.begin().await?;

    let due = sqlx::query_as::<_, DueRecipient>(
        r#"
        SELECT r.id, r.sequence_id, r.candidate_id, r.current_template_index, r.last_event,
               s.user_id, s.schedule_type, s.schedule_config,
               c.full_name, c.email, c.current_company, c.current_title
        FROM sequence_recipients r
        JOIN email_sequences s ON s.id = r.sequence_id
        JOIN candidates c ON c.id = r.candidate_id
        WHERE r.status = 'active'
          AND s.status = 'active'
          AND r.next_send_at IS NOT NULL
          AND r.next_send_at <= $1
        ORDER BY r.next_send_at
        LIMIT $2
        FOR UPDATE OF r SKIP LOCKED
        "#,
    )
    .bind(now)
    .bind(batch_size.max(1))
    .fetch_all(&mut *tx)
    .await?;

    if due.is_empty() {
        tx.commit().await?;
        return Ok(report);
    }

    let mut conn = queue.connect().await?;
    let mut templates: HashMap<Uuid, Vec<EmailTemplateRow>> = HashMap::new();
    let mut senders: HashMap<Uuid, Option<ProfileRow>> = HashMap::new();

    for recipient in &due {
        report.examined += 1;

        let schedule = match Schedule::from_row(&recipient.schedule_type, &recipient.schedule_config)
        {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!(
                    "Sequence {} has an unusable schedule ({e}); failing recipient {}",
                    recipient.sequence_id, recipient.id
                );
                finish_recipient(&mut tx, recipient.id, "failed").await?;
                report.failed += 1;
                continue;
            }
        };

        if !templates.contains_key(&recipient.sequence_id) {
            let rows = sqlx::query_as::<_, EmailTemplateRow>(
                "SELECT * FROM email_templates WHERE sequence_id = $1 ORDER BY order_index ASC",
            )
            .bind(recipient.sequence_id)
            .fetch_all(&mut *tx)
            .await?;
            templates.insert(recipient.sequence_id, rows);
        }
        let steps = &templates[&recipient.sequence_id];

        let last_event = recipient.last_event.as_deref().and_then(RecipientEvent::parse);
        let current = usize::try_from(recipient.current_template_index).unwrap_or(0);

        match plan_step(current, steps.len(), last_event, &schedule, now) {
            StepDecision::Complete => {
                finish_recipient(&mut tx, recipient.id, "completed").await?;
                report.completed += 1;
            }
            StepDecision::Halt(event) => {
                finish_recipient(&mut tx, recipient.id, event.as_str()).await?;
                report.halted += 1;
            }
            StepDecision::Skip {
                index,
                next_index,
                next_send_at,
            } => {
                let template = &steps[index];
                insert_log(&mut tx, recipient, template, "skipped", &template.subject, "", None)
                    .await?;
                advance_recipient(&mut tx, recipient.id, next_index, next_send_at, false).await?;
                report.skipped += 1;
                if next_send_at.is_none() {
                    report.completed += 1;
                }
            }
            StepDecision::Send {
                index,
                next_index,
                next_send_at,
            } => {
                let template = &steps[index];

                let Some(to) = recipient.email.clone() else {
                    insert_log(
                        &mut tx,
                        recipient,
                        template,
                        "failed",
                        &template.subject,
                        "",
                        Some("candidate has no email address"),
                    )
                    .await?;
                    finish_recipient(&mut tx, recipient.id, "failed").await?;
                    report.failed += 1;
                    continue;
                };

                if !senders.contains_key(&recipient.user_id) {
                    let profile =
                        sqlx::query_as::<_, ProfileRow>("SELECT * FROM profiles WHERE id = $1")
                            .bind(recipient.user_id)
                            .fetch_optional(&mut *tx)
                            .await?;
                    senders.insert(recipient.user_id, profile);
                }
                let sender = senders[&recipient.user_id].as_ref();

                let vars = TemplateVars {
                    full_name: recipient.full_name.clone(),
                    company: recipient.current_company.clone(),
                    title: recipient.current_title.clone(),
                    sender_name: sender.and_then(|p| p.full_name.clone()),
                    sender_company: sender.and_then(|p| p.company.clone()),
                    signature: sender.and_then(|p| p.email_signature.clone()),
                };
                let subject = render(&template.subject, &vars);
                let body = render(&template.body, &vars);

                let log_id =
                    insert_log(&mut tx, recipient, template, "queued", &subject, &body, None)
                        .await?;
                queue
                    .push(
                        &mut conn,
                        &OutboundEmail {
                            log_id,
                            sequence_id: recipient.sequence_id,
                            recipient_id: recipient.id,
                            candidate_id: recipient.candidate_id,
                            to,
                            subject,
                            body,
                            order_index: template.order_index,
                            queued_at: now,
                        },
                    )
                    .await?;
                advance_recipient(&mut tx, recipient.id, next_index, next_send_at, true).await?;
                report.sent += 1;
                if next_send_at.is_none() {
                    report.completed += 1;
                }
            }
        }
    }

    tx.commit().await?;
    info!(
        "Dispatch run: examined={}, sent={}, skipped={}, completed={}, halted={}, failed={}",
        report.examined,
        report.sent,
        report.skipped,
        report.completed,
        report.halted,
        report.failed
    );
    Ok(report)
}

/// Runs `dispatch_due` every `interval` until the process exits.
pub fn spawn_dispatch_loop(state: AppState, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = dispatch_due(
                &state.db,
                &state.outbound,
                Utc::now(),
                state.config.dispatch_batch_size,
            )
            .await
            {
                error!("Sequence dispatch failed: {e}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::sequences::schedule::{ScheduleConfig, ScheduleType, StepDelay, Trigger};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 4, 10, 0, 0).unwrap()
    }

    fn delay_schedule() -> Schedule {
        Schedule {
            schedule_type: ScheduleType::Delay,
            schedule_config: ScheduleConfig {
                step_delays: vec![StepDelay::default(), StepDelay { days: 3, hours: 0 }],
                ..Default::default()
            },
        }
    }

    fn trigger_schedule(condition: TriggerCondition) -> Schedule {
        Schedule {
            schedule_type: ScheduleType::Trigger,
            schedule_config: ScheduleConfig {
                step_delays: vec![StepDelay::default(), StepDelay { days: 2, hours: 0 }],
                trigger: Some(Trigger { condition }),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_first_step_sends_and_schedules_next() {
        let decision = plan_step(0, 3, None, &delay_schedule(), now());
        assert_eq!(
            decision,
            StepDecision::Send {
                index: 0,
                next_index: 1,
                next_send_at: Some(now() + chrono::Duration::days(3)),
            }
        );
    }

    #[test]
    fn test_last_step_sends_without_next_time() {
        let decision = plan_step(2, 3, None, &delay_schedule(), now());
        assert_eq!(
            decision,
            StepDecision::Send {
                index: 2,
                next_index: 3,
                next_send_at: None,
            }
        );
    }

    #[test]
    fn test_past_end_completes() {
        assert_eq!(
            plan_step(3, 3, None, &delay_schedule(), now()),
            StepDecision::Complete
        );
        assert_eq!(
            plan_step(0, 0, None, &delay_schedule(), now()),
            StepDecision::Complete
        );
    }

    #[test]
    fn test_reply_halts_any_schedule() {
        for schedule in [delay_schedule(), trigger_schedule(TriggerCondition::Opened)] {
            assert_eq!(
                plan_step(1, 3, Some(RecipientEvent::Replied), &schedule, now()),
                StepDecision::Halt(RecipientEvent::Replied)
            );
        }
        assert_eq!(
            plan_step(1, 3, Some(RecipientEvent::Unsubscribed), &delay_schedule(), now()),
            StepDecision::Halt(RecipientEvent::Unsubscribed)
        );
    }

    #[test]
    fn test_opened_trigger_skips_unengaged_recipients() {
        let schedule = trigger_schedule(TriggerCondition::Opened);
        assert!(matches!(
            plan_step(1, 3, None, &schedule, now()),
            StepDecision::Skip { index: 1, .. }
        ));
        assert!(matches!(
            plan_step(1, 3, Some(RecipientEvent::Clicked), &schedule, now()),
            StepDecision::Send { index: 1, .. }
        ));
    }

    #[test]
    fn test_not_opened_trigger_skips_engaged_recipients() {
        let schedule = trigger_schedule(TriggerCondition::NotOpened);
        assert!(matches!(
            plan_step(1, 3, Some(RecipientEvent::Opened), &schedule, now()),
            StepDecision::Skip { .. }
        ));
        assert!(matches!(
            plan_step(1, 3, None, &schedule, now()),
            StepDecision::Send { .. }
        ));
    }

    #[test]
    fn test_first_email_ignores_trigger() {
        let schedule = trigger_schedule(TriggerCondition::Opened);
        assert!(matches!(
            plan_step(0, 2, None, &schedule, now()),
            StepDecision::Send { index: 0, .. }
        ));
    }

    #[test]
    fn test_no_reply_trigger_sends_while_silent() {
        let schedule = trigger_schedule(TriggerCondition::NoReply);
        assert!(matches!(
            plan_step(1, 2, Some(RecipientEvent::Opened), &schedule, now()),
            StepDecision::Send {
                next_send_at: None,
                ..
            }
        ));
    }

    #[test]
    fn test_unbounded_stored_delay_cannot_panic_the_dispatcher() {
        let stored = serde_json::json!({"step_delays": [{"days": 0}, {"days": 4_000_000_000u64}]});
        assert!(Schedule::from_row("delay", &stored).is_err());

        let unchecked = Schedule {
            schedule_type: ScheduleType::Delay,
            schedule_config: ScheduleConfig {
                step_delays: vec![StepDelay::default(), StepDelay { days: u32::MAX, hours: 0 }],
                ..Default::default()
            },
        };
        assert!(matches!(
            plan_step(0, 2, None, &unchecked, now()),
            StepDecision::Send {
                next_send_at: Some(_),
                ..
            }
        ));
    }
}

