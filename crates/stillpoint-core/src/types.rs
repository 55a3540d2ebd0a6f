//! Data model shared by the guard engine, the store and the CLI.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// An application the user has designated for interception.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardedApp {
    /// Platform identifier (package name / bundle id). Unique.
    pub identifier: String,
    pub display_name: String,
    pub is_active: bool,
    pub added_at: DateTime<Utc>,
}

impl GuardedApp {
    pub fn new(identifier: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: display_name.into(),
            is_active: true,
            added_at: Utc::now(),
        }
    }
}

/// When interventions are allowed to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    Always,
    /// 18:00 to 07:00 local time.
    Evening,
    /// The whole of the configured sabbath day.
    Sabbath,
    /// The window described by [`CustomSchedule`].
    Custom,
    /// A stored value this build does not understand. Evaluates as active.
    #[serde(other)]
    Unrecognized,
}

impl ScheduleMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleMode::Always => "always",
            ScheduleMode::Evening => "evening",
            ScheduleMode::Sabbath => "sabbath",
            ScheduleMode::Custom => "custom",
            ScheduleMode::Unrecognized => "unrecognized",
        }
    }

    /// Decode a stored mode. Unknown strings never fail.
    pub fn from_stored(value: &str) -> Self {
        value.parse().unwrap_or(ScheduleMode::Unrecognized)
    }
}

impl fmt::Display for ScheduleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(ScheduleMode::Always),
            "evening" => Ok(ScheduleMode::Evening),
            "sabbath" => Ok(ScheduleMode::Sabbath),
            "custom" => Ok(ScheduleMode::Custom),
            other => Err(ValidationError::InvalidValue {
                field: "schedule_mode".into(),
                message: format!("unknown mode '{other}'"),
            }),
        }
    }
}

/// Parameters for [`ScheduleMode::Custom`].
///
/// Minutes are counted from local midnight. `start_minute > end_minute`
/// wraps over midnight; equal values cover the whole day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomSchedule {
    pub start_minute: u16,
    pub end_minute: u16,
    /// Empty means every day.
    #[serde(default)]
    pub days: Vec<Weekday>,
}

impl Default for CustomSchedule {
    fn default() -> Self {
        Self {
            start_minute: 21 * 60,
            end_minute: 6 * 60,
            days: Vec::new(),
        }
    }
}

impl CustomSchedule {
    /// Build from `HH:MM` strings.
    pub fn from_clock(start: &str, end: &str, days: Vec<Weekday>) -> Result<Self, ValidationError> {
        Ok(Self {
            start_minute: parse_clock("start", start)?,
            end_minute: parse_clock("end", end)?,
            days,
        })
    }
}

fn parse_clock(field: &str, value: &str) -> Result<u16, ValidationError> {
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|e| {
        ValidationError::InvalidValue {
            field: field.into(),
            message: format!("expected HH:MM, got '{value}': {e}"),
        }
    })?;
    Ok((time.hour() * 60 + time.minute()) as u16)
}

/// The singleton settings record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub schedule_mode: ScheduleMode,
    #[serde(default)]
    pub custom_schedule: CustomSchedule,
    pub sabbath_day: Weekday,
    pub snooze_until: Option<DateTime<Utc>>,
    pub personal_commitment: Option<String>,
    pub is_premium: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schedule_mode: ScheduleMode::Always,
            custom_schedule: CustomSchedule::default(),
            sabbath_day: Weekday::Sun,
            snooze_until: None,
            personal_commitment: None,
            is_premium: false,
        }
    }
}

impl Settings {
    pub fn is_snoozed(&self, now: DateTime<Utc>) -> bool {
        self.snooze_until.is_some_and(|until| now < until)
    }
}

/// How the user resolved an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Returned to reflection instead of opening the app.
    Resisted,
    /// Chose to continue into the app.
    Proceeded,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Resisted => "resisted",
            Outcome::Proceeded => "proceeded",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resisted" => Ok(Outcome::Resisted),
            "proceeded" => Ok(Outcome::Proceeded),
            other => Err(ValidationError::InvalidValue {
                field: "outcome".into(),
                message: format!("unknown outcome '{other}'"),
            }),
        }
    }
}

/// A resolved intervention about to be appended to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIntervention {
    pub timestamp: DateTime<Utc>,
    pub source_identifier: String,
    pub source_name: String,
    pub outcome: Outcome,
    pub scripture_reference: String,
    pub pause_duration_secs: u32,
    /// 1-based, per app per local calendar day.
    pub attempt_number: u32,
    pub estimated_time_saved_secs: u32,
}

/// A row of the intervention log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intervention {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub source_identifier: String,
    pub source_name: String,
    pub outcome: Outcome,
    pub scripture_reference: String,
    pub pause_duration_secs: u32,
    pub attempt_number: u32,
    pub estimated_time_saved_secs: u32,
}

impl Intervention {
    pub fn from_new(id: i64, record: NewIntervention) -> Self {
        Self {
            id,
            timestamp: record.timestamp,
            source_identifier: record.source_identifier,
            source_name: record.source_name,
            outcome: record.outcome,
            scripture_reference: record.scripture_reference,
            pause_duration_secs: record.pause_duration_secs,
            attempt_number: record.attempt_number,
            estimated_time_saved_secs: record.estimated_time_saved_secs,
        }
    }
}
