pub mod apps;
pub mod config;
pub mod log;
pub mod settings;
pub mod simulate;
pub mod snooze;

use chrono::{DateTime, Duration, Utc};
use stillpoint_core::{Config, Database};

/// Open the database named by the loaded config.
pub fn open_database() -> Result<Database, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    Ok(Database::open_at(&config.database_path()?)?)
}

/// End of a snooze of `minutes` starting at `now`.
pub fn snooze_deadline(
    now: DateTime<Utc>,
    minutes: i64,
) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    if minutes <= 0 {
        return Err("minutes must be greater than zero".into());
    }
    Duration::try_minutes(minutes)
        .and_then(|span| now.checked_add_signed(span))
        .ok_or_else(|| format!("snooze of {minutes} minutes is out of range").into())
}
