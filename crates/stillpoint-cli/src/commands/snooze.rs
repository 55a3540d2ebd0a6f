use chrono::Utc;
use clap::Subcommand;
use serde_json::json;
use stillpoint_core::Store;

use super::{open_database, snooze_deadline};

#[derive(Subcommand)]
pub enum SnoozeAction {
    /// Suppress all interventions for a number of minutes
    Set {
        minutes: u32,
    },
    /// End the snooze now
    Clear,
    /// Show whether a snooze is in effect
    Status,
}

pub fn run(action: SnoozeAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_database()?;

    match action {
        SnoozeAction::Set { minutes } => {
            let until = snooze_deadline(Utc::now(), i64::from(minutes))?;
            db.set_snooze_until(Some(until))?;
            println!("{}", json!({ "snoozed": true, "until": until }));
        }
        SnoozeAction::Clear => {
            db.set_snooze_until(None)?;
            println!("{}", json!({ "snoozed": false, "until": null }));
        }
        SnoozeAction::Status => {
            let settings = db.settings()?;
            let now = Utc::now();
            let snoozed = settings.is_snoozed(now);
            let remaining_secs = settings
                .snooze_until
                .filter(|_| snoozed)
                .map(|until| (until - now).num_seconds());
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "snoozed": snoozed,
                    "until": settings.snooze_until,
                    "remaining_secs": remaining_secs,
                }))?
            );
        }
    }
    Ok(())
}
