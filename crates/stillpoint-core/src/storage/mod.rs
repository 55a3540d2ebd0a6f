mod config;
pub mod database;
pub mod memory;
pub mod migrations;

pub use config::{Config, GuardConfig, LoggingConfig, StorageConfig};
pub use database::Database;
pub use memory::MemoryStore;

use std::path::PathBuf;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::content::{DailyContent, Season};
use crate::error::{ConfigError, Result};
use crate::types::{GuardedApp, Intervention, NewIntervention, Settings};

/// The persistence boundary consumed by the guard engine.
///
/// Implementations must be callable from the service loop and from a
/// blocking worker at the same time, hence `Send + Sync` and `&self`.
pub trait Store: Send + Sync {
    /// All guarded apps with `is_active` set.
    fn active_guarded_apps(&self) -> Result<Vec<GuardedApp>>;

    /// The settings singleton. Created with defaults on first access.
    fn settings(&self) -> Result<Settings>;

    /// Persist (or clear) the snooze deadline.
    fn set_snooze_until(&self, until: Option<DateTime<Utc>>) -> Result<()>;

    /// Resolved interventions for `app_id` during the local calendar `day`.
    fn today_attempt_count(&self, app_id: &str, day: NaiveDate) -> Result<u32>;

    /// Append one resolved intervention. Returns the new row id.
    fn append_intervention(&self, record: &NewIntervention) -> Result<i64>;

    /// Interventions with `start <= timestamp < end`, newest first.
    fn interventions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Intervention>>;

    /// Seeded content for a season day, if any.
    fn daily_content(&self, season: Season, day_in_season: u32) -> Result<Option<DailyContent>>;
}

/// Returns the data directory.
///
/// `STILLPOINT_DATA_DIR` wins when set. Otherwise `~/.config/stillpoint`,
/// or `~/.config/stillpoint-dev` with `STILLPOINT_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("STILLPOINT_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env =
                std::env::var("STILLPOINT_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("stillpoint-dev")
            } else {
                base_dir.join("stillpoint")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

/// UTC instants bounding the local calendar `day`: `[start, end)`.
pub fn local_day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let next = day.succ_opt().unwrap_or(NaiveDate::MAX);
    (local_midnight(day), local_midnight(next))
}

fn local_midnight(day: NaiveDate) -> DateTime<Utc> {
    let midnight = day.and_time(NaiveTime::MIN);
    // Some zones skip midnight on DST changes; the day then starts an hour later.
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .or_else(|| Local.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}
