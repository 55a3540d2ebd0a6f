//! Schedule evaluation: is the guard active at a given local time?

use chrono::{DateTime, Datelike, TimeZone, Timelike};

use crate::types::{CustomSchedule, ScheduleMode, Settings};

/// Evening window: 18:00 inclusive to 07:00 exclusive.
const EVENING_START_HOUR: u32 = 18;
const EVENING_END_HOUR: u32 = 7;

/// Whether interventions may fire at `now` (interpreted in its own zone).
pub fn is_active<Tz: TimeZone>(now: &DateTime<Tz>, settings: &Settings) -> bool {
    match settings.schedule_mode {
        ScheduleMode::Always => true,
        ScheduleMode::Evening => {
            let hour = now.hour();
            hour >= EVENING_START_HOUR || hour < EVENING_END_HOUR
        }
        ScheduleMode::Sabbath => now.weekday() == settings.sabbath_day,
        ScheduleMode::Custom => custom_window_contains(now, &settings.custom_schedule),
        // Fail open.
        ScheduleMode::Unrecognized => true,
    }
}

fn custom_window_contains<Tz: TimeZone>(now: &DateTime<Tz>, window: &CustomSchedule) -> bool {
    if !window.days.is_empty() && !window.days.contains(&now.weekday()) {
        return false;
    }

    let minute = (now.hour() * 60 + now.minute()) as u16;
    let (start, end) = (window.start_minute, window.end_minute);
    if start == end {
        true
    } else if start < end {
        minute >= start && minute < end
    } else {
        minute >= start || minute < end
    }
}
