use chrono::{Days, Local, NaiveDate};
use clap::Subcommand;
use serde_json::json;
use stillpoint_core::stats;

use super::open_database;

#[derive(Subcommand)]
pub enum LogAction {
    /// Today's headline numbers
    Today,
    /// Interventions in a local date range, newest first
    Range {
        /// First day (YYYY-MM-DD)
        from: NaiveDate,
        /// Last day, inclusive (YYYY-MM-DD). Defaults to today
        to: Option<NaiveDate>,
    },
    /// Per-app breakdown over the last N days
    Summary {
        /// Number of days including today
        #[arg(long, default_value = "7")]
        days: u32,
    },
}

pub fn run(action: LogAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_database()?;
    let today = Local::now().date_naive();

    match action {
        LogAction::Today => {
            let stats = stats::today_stats(&db)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        LogAction::Range { from, to } => {
            let rows = stats::interventions_for_days(&db, from, to.unwrap_or(today))?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        LogAction::Summary { days } => {
            if days == 0 {
                return Err("days must be greater than zero".into());
            }
            let from = today
                .checked_sub_days(Days::new(u64::from(days) - 1))
                .ok_or_else(|| format!("days out of range: {days}"))?;
            let rows = stats::interventions_for_days(&db, from, today)?;
            let summary = json!({
                "from": from,
                "to": today,
                "totals": stats::TodayStats::from_interventions(&rows),
                "apps": stats::summarize_by_app(&rows),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}
