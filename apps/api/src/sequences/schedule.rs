//! Send-time computation for sequence steps.
//!
//! A schedule is stored as `schedule_type` plus a JSON `schedule_config`.
//! `step_delays[i]` is the wait before email `i`, measured from enrollment
//! for the first email and from the previous send afterwards. All hours are UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Immediate,
    Delay,
    Trigger,
}

impl ScheduleType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleType::Immediate => "immediate",
            ScheduleType::Delay => "delay",
            ScheduleType::Trigger => "trigger",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "immediate" => Ok(ScheduleType::Immediate),
            "delay" => Ok(ScheduleType::Delay),
            "trigger" => Ok(ScheduleType::Trigger),
            other => Err(AppError::Validation(format!(
                "unknown schedule_type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StepDelay {
    #[serde(default)]
    pub days: u32,
    #[serde(default)]
    pub hours: u32,
}

impl StepDelay {
    pub fn duration(&self) -> Duration {
        Duration::days(i64::from(self.days)) + Duration::hours(i64::from(self.hours))
    }
}

/// Daily window in which emails may go out: `[start_hour, end_hour)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCondition {
    /// Continue while the candidate has not replied.
    NoReply,
    /// Send the next email only to candidates who opened the previous one.
    Opened,
    /// Send the next email only to candidates who did not open the previous one.
    NotOpened,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trigger {
    pub condition: TriggerCondition,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub step_delays: Vec<StepDelay>,
    #[serde(default)]
    pub send_window: Option<SendWindow>,
    #[serde(default)]
    pub skip_weekends: bool,
    #[serde(default)]
    pub trigger: Option<Trigger>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    pub schedule_type: ScheduleType,
    #[serde(default)]
    pub schedule_config: ScheduleConfig,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            schedule_type: ScheduleType::Delay,
            schedule_config: ScheduleConfig::default(),
        }
    }
}

/// Longest wait allowed between two emails.
pub const MAX_DELAY_DAYS: u32 = 365;

/// `t + d`, clamped to the latest representable time.
fn add_saturating(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    t.checked_add_signed(d).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn at_hour(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default();
    Utc.from_utc_datetime(&date.and_time(time))
}

impl Schedule {
    /// Rebuilds a schedule from its stored columns. Stored schedules that no
    /// longer pass `validate` are rejected.
    pub fn from_row(schedule_type: &str, schedule_config: &Value) -> Result<Self, AppError> {
        let schedule_config = if schedule_config.is_null() {
            ScheduleConfig::default()
        } else {
            serde_json::from_value(schedule_config.clone()).map_err(|e| {
                AppError::Validation(format!("invalid schedule_config: {e}"))
            })?
        };
        let schedule = Schedule {
            schedule_type: ScheduleType::parse(schedule_type)?,
            schedule_config,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn config_json(&self) -> Value {
        serde_json::to_value(&self.schedule_config).unwrap_or(Value::Null)
    }

    pub fn trigger_condition(&self) -> Option<TriggerCondition> {
        match self.schedule_type {
            ScheduleType::Trigger => self.schedule_config.trigger.map(|t| t.condition),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let config = &self.schedule_config;
        if let Some(window) = config.send_window {
            if window.start_hour > 23 || window.end_hour > 24 {
                return Err(AppError::Validation(
                    "send_window start_hour must be within 0..=23 and end_hour within 1..=24"
                        .to_string(),
                ));
            }
            if window.start_hour >= window.end_hour {
                return Err(AppError::Validation(
                    "send_window start_hour must be before end_hour".to_string(),
                ));
            }
        }
        for (i, delay) in config.step_delays.iter().enumerate() {
            if delay.days > MAX_DELAY_DAYS || delay.hours > 23 {
                return Err(AppError::Validation(format!(
                    "step_delays[{i}] must have days within 0..={MAX_DELAY_DAYS} and hours within 0..=23"
                )));
            }
        }
        match (self.schedule_type, config.trigger) {
            (ScheduleType::Trigger, None) => Err(AppError::Validation(
                "trigger schedules require a trigger".to_string(),
            )),
            (ScheduleType::Immediate | ScheduleType::Delay, Some(_)) => Err(AppError::Validation(
                "trigger is only valid for trigger schedules".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Wait before email `index`.
    fn delay_for(&self, index: usize) -> Duration {
        let delays = &self.schedule_config.step_delays;
        if index == 0 {
            return delays.first().map(StepDelay::duration).unwrap_or_else(Duration::zero);
        }
        delays
            .get(index)
            .or_else(|| delays.get(1..).and_then(<[StepDelay]>::last))
            .map(StepDelay::duration)
            .unwrap_or_else(|| Duration::days(1))
    }

    /// When the first email goes out for a recipient enrolled at `now`.
    pub fn first_send_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.schedule_type {
            ScheduleType::Immediate => now,
            ScheduleType::Delay | ScheduleType::Trigger => self.adjust(add_saturating(now, self.delay_for(0))),
        }
    }

    /// When email `next_index` goes out, given the previous send at `after`.
    pub fn next_send_at(&self, after: DateTime<Utc>, next_index: usize) -> DateTime<Utc> {
        self.adjust(add_saturating(after, self.delay_for(next_index)))
    }

    /// Moves `t` into the send window and off weekends when configured.
    fn adjust(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let config = &self.schedule_config;
        let mut t = t;

        if let Some(window) = config.send_window {
            let hour = t.hour();
            if hour < window.start_hour {
                t = at_hour(t.date_naive(), window.start_hour);
            } else if hour >= window.end_hour {
                t = at_hour(add_saturating(t, Duration::days(1)).date_naive(), window.start_hour);
            }
        }

        if config.skip_weekends {
            let shift = match t.weekday() {
                Weekday::Sat => 2,
                Weekday::Sun => 1,
                _ => 0,
            };
            if shift > 0 {
                let date = add_saturating(t, Duration::days(shift)).date_naive();
                t = match config.send_window {
                    Some(window) => at_hour(date, window.start_hour),
                    None => Utc.from_utc_datetime(&date.and_time(t.time())),
                };
            }
        }

        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn delay_schedule(delays: &[(u32, u32)]) -> Schedule {
        Schedule {
            schedule_type: ScheduleType::Delay,
            schedule_config: ScheduleConfig {
                step_delays: delays
                    .iter()
                    .map(|&(days, hours)| StepDelay { days, hours })
                    .collect(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_immediate_first_send_is_now() {
        let schedule = Schedule {
            schedule_type: ScheduleType::Immediate,
            schedule_config: ScheduleConfig {
                step_delays: vec![StepDelay { days: 5, hours: 0 }],
                skip_weekends: true,
                ..Default::default()
            },
        };
        // Saturday: immediate still sends right away.
        let now = utc(2024, 6, 8, 12, 0);
        assert_eq!(schedule.first_send_at(now), now);
    }

    #[test]
    fn test_delay_first_send_uses_step_zero() {
        let schedule = delay_schedule(&[(0, 4), (2, 0)]);
        let now = utc(2024, 6, 4, 10, 0);
        assert_eq!(schedule.first_send_at(now), utc(2024, 6, 4, 14, 0));
    }

    #[test]
    fn test_next_send_uses_configured_delays() {
        let schedule = delay_schedule(&[(0, 0), (2, 0), (3, 12)]);
        let sent = utc(2024, 6, 3, 9, 0);
        assert_eq!(schedule.next_send_at(sent, 1), utc(2024, 6, 5, 9, 0));
        assert_eq!(schedule.next_send_at(sent, 2), utc(2024, 6, 6, 21, 0));
    }

    #[test]
    fn test_missing_delays_reuse_last_followup_delay() {
        let schedule = delay_schedule(&[(0, 0), (2, 0), (3, 0)]);
        let sent = utc(2024, 6, 3, 9, 0);
        assert_eq!(schedule.next_send_at(sent, 7), utc(2024, 6, 6, 9, 0));
    }

    #[test]
    fn test_first_step_delay_is_not_reused_for_followups() {
        let schedule = delay_schedule(&[(2, 0)]);
        let sent = utc(2024, 6, 3, 9, 0);
        assert_eq!(schedule.next_send_at(sent, 1), utc(2024, 6, 4, 9, 0));
    }

    #[test]
    fn test_no_followup_delays_default_to_one_day() {
        let schedule = delay_schedule(&[(0, 0)]);
        let sent = utc(2024, 6, 3, 9, 0);
        assert_eq!(schedule.next_send_at(sent, 1), utc(2024, 6, 4, 9, 0));
        assert_eq!(Schedule::default().next_send_at(sent, 3), utc(2024, 6, 4, 9, 0));
    }

    #[test]
    fn test_send_window_moves_early_and_late_times() {
        let mut schedule = delay_schedule(&[]);
        schedule.schedule_config.send_window = Some(SendWindow {
            start_hour: 9,
            end_hour: 17,
        });
        assert_eq!(
            schedule.first_send_at(utc(2024, 6, 4, 6, 30)),
            utc(2024, 6, 4, 9, 0)
        );
        assert_eq!(
            schedule.first_send_at(utc(2024, 6, 4, 22, 0)),
            utc(2024, 6, 5, 9, 0)
        );
        assert_eq!(
            schedule.first_send_at(utc(2024, 6, 4, 12, 15)),
            utc(2024, 6, 4, 12, 15)
        );
    }

    #[test]
    fn test_skip_weekends_moves_to_monday() {
        let mut schedule = delay_schedule(&[]);
        schedule.schedule_config.skip_weekends = true;
        // 2024-06-08 is a Saturday.
        assert_eq!(
            schedule.first_send_at(utc(2024, 6, 8, 10, 0)),
            utc(2024, 6, 10, 10, 0)
        );
        assert_eq!(
            schedule.first_send_at(utc(2024, 6, 9, 10, 0)),
            utc(2024, 6, 10, 10, 0)
        );
    }

    #[test]
    fn test_friday_evening_with_window_lands_monday_morning() {
        let mut schedule = delay_schedule(&[]);
        schedule.schedule_config.skip_weekends = true;
        schedule.schedule_config.send_window = Some(SendWindow {
            start_hour: 9,
            end_hour: 17,
        });
        assert_eq!(
            schedule.first_send_at(utc(2024, 6, 7, 18, 0)),
            utc(2024, 6, 10, 9, 0)
        );
    }

    #[test]
    fn test_from_row_round_trips_config() {
        let schedule = Schedule::from_row(
            "trigger",
            &json!({
                "step_delays": [{"days": 0}, {"days": 3}],
                "skip_weekends": true,
                "trigger": {"condition": "no_reply"}
            }),
        )
        .unwrap();
        assert_eq!(schedule.schedule_type, ScheduleType::Trigger);
        assert_eq!(schedule.trigger_condition(), Some(TriggerCondition::NoReply));
        assert_eq!(schedule.schedule_config.step_delays[1].days, 3);
        assert!(schedule.validate().is_ok());
        assert_eq!(
            Schedule::from_row("trigger", &schedule.config_json()).unwrap(),
            schedule
        );
    }

    #[test]
    fn test_from_row_accepts_null_config() {
        let schedule = Schedule::from_row("delay", &Value::Null).unwrap();
        assert_eq!(schedule.schedule_config, ScheduleConfig::default());
    }

    #[test]
    fn test_from_row_rejects_unknown_type() {
        assert!(Schedule::from_row("weekly", &json!({})).is_err());
    }

    #[test]
    fn test_validate_rules() {
        let mut schedule = delay_schedule(&[]);
        schedule.schedule_config.send_window = Some(SendWindow {
            start_hour: 17,
            end_hour: 9,
        });
        assert!(schedule.validate().is_err());

        let trigger_without_condition = Schedule {
            schedule_type: ScheduleType::Trigger,
            schedule_config: ScheduleConfig::default(),
        };
        assert!(trigger_without_condition.validate().is_err());

        let mut delay_with_trigger = delay_schedule(&[]);
        delay_with_trigger.schedule_config.trigger = Some(Trigger {
            condition: TriggerCondition::Opened,
        });
        assert!(delay_with_trigger.validate().is_err());
        assert_eq!(delay_with_trigger.trigger_condition(), None);
    }

    #[test]
    fn test_oversized_delays_are_rejected() {
        let too_many_days = delay_schedule(&[(0, 0), (4_000_000_000, 0)]);
        assert!(matches!(
            too_many_days.validate(),
            Err(AppError::Validation(_))
        ));
        assert!(delay_schedule(&[(0, 24)]).validate().is_err());
        assert!(delay_schedule(&[(0, 0), (MAX_DELAY_DAYS, 23)]).validate().is_ok());

        let stored = json!({"step_delays": [{"days": 0}, {"days": 4_000_000_000u64}]});
        assert!(Schedule::from_row("delay", &stored).is_err());
    }

    #[test]
    fn test_huge_delay_saturates_instead_of_overflowing() {
        let schedule = delay_schedule(&[(u32::MAX, 0), (u32::MAX, u32::MAX)]);
        let now = utc(2024, 6, 4, 10, 0);
        assert_eq!(schedule.first_send_at(now), DateTime::<Utc>::MAX_UTC);
        assert_eq!(schedule.next_send_at(now, 1), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_send_window_may_end_at_midnight() {
        let schedule = Schedule {
            schedule_type: ScheduleType::Delay,
            schedule_config: ScheduleConfig {
                send_window: Some(SendWindow {
                    start_hour: 8,
                    end_hour: 24,
                }),
                ..Default::default()
            },
        };
        assert!(schedule.validate().is_ok());
    }
}
