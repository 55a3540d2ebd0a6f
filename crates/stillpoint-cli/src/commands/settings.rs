use chrono::Weekday;
use clap::Subcommand;
use stillpoint_core::{CustomSchedule, ScheduleMode, Store};

use super::open_database;

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Show current settings
    Show,
    /// Change when interventions fire
    Schedule {
        /// always, evening, sabbath or custom
        mode: ScheduleMode,
        /// Custom window start (HH:MM)
        #[arg(long)]
        start: Option<String>,
        /// Custom window end (HH:MM)
        #[arg(long)]
        end: Option<String>,
        /// Custom window days, comma-separated (e.g. "mon,tue"). Empty means every day
        #[arg(long, value_delimiter = ',')]
        days: Vec<Weekday>,
        /// Day observed in sabbath mode (e.g. "sun")
        #[arg(long)]
        sabbath_day: Option<Weekday>,
    },
    /// Set the personal commitment shown after resisting
    Commitment {
        /// Commitment text; omit to clear
        text: Option<String>,
    },
}

pub fn run(action: SettingsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_database()?;

    match action {
        SettingsAction::Show => {
            let settings = db.settings()?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        SettingsAction::Schedule {
            mode,
            start,
            end,
            days,
            sabbath_day,
        } => {
            if mode == ScheduleMode::Unrecognized {
                return Err("unknown schedule mode".into());
            }
            let mut settings = db.settings()?;
            settings.schedule_mode = mode;

            if start.is_some() || end.is_some() || !days.is_empty() {
                let current = &settings.custom_schedule;
                let start = start.unwrap_or_else(|| clock(current.start_minute));
                let end = end.unwrap_or_else(|| clock(current.end_minute));
                let days = if days.is_empty() { current.days.clone() } else { days };
                settings.custom_schedule = CustomSchedule::from_clock(&start, &end, days)?;
            }
            if let Some(day) = sabbath_day {
                settings.sabbath_day = day;
            }

            db.update_settings(&settings)?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        SettingsAction::Commitment { text } => {
            let text = text.filter(|t| !t.trim().is_empty());
            db.set_personal_commitment(text.as_deref())?;
            match text {
                Some(text) => println!("commitment set: {text}"),
                None => println!("commitment cleared"),
            }
        }
    }
    Ok(())
}

fn clock(minute: u16) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}
