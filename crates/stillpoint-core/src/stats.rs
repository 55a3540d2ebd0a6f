//! Reporting over the intervention log.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::storage::{local_day_bounds, Store};
use crate::types::{Intervention, Outcome};

/// Headline numbers for one day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodayStats {
    /// Interventions shown and resolved.
    pub guarded_count: u32,
    pub resisted_count: u32,
    pub time_reclaimed_secs: u64,
}

/// Per-app breakdown over a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSummary {
    pub app_id: String,
    pub app_name: String,
    pub attempts: u32,
    pub resisted: u32,
    pub proceeded: u32,
    pub time_reclaimed_secs: u64,
    /// Highest attempt number reached on any single day.
    pub max_attempt_number: u32,
}

impl TodayStats {
    pub fn from_interventions(rows: &[Intervention]) -> Self {
        rows.iter().fold(Self::default(), |mut stats, row| {
            stats.guarded_count += 1;
            if row.outcome == Outcome::Resisted {
                stats.resisted_count += 1;
                stats.time_reclaimed_secs += u64::from(row.estimated_time_saved_secs);
            }
            stats
        })
    }
}

/// Summaries ordered by attempts (most first), then app id.
pub fn summarize_by_app(rows: &[Intervention]) -> Vec<AppSummary> {
    let mut by_app: BTreeMap<&str, AppSummary> = BTreeMap::new();
    for row in rows {
        let entry = by_app
            .entry(row.source_identifier.as_str())
            .or_insert_with(|| AppSummary {
                app_id: row.source_identifier.clone(),
                app_name: row.source_name.clone(),
                attempts: 0,
                resisted: 0,
                proceeded: 0,
                time_reclaimed_secs: 0,
                max_attempt_number: 0,
            });
        entry.attempts += 1;
        match row.outcome {
            Outcome::Resisted => {
                entry.resisted += 1;
                entry.time_reclaimed_secs += u64::from(row.estimated_time_saved_secs);
            }
            Outcome::Proceeded => entry.proceeded += 1,
        }
        entry.max_attempt_number = entry.max_attempt_number.max(row.attempt_number);
    }

    let mut summaries: Vec<AppSummary> = by_app.into_values().collect();
    summaries.sort_by(|a, b| b.attempts.cmp(&a.attempts).then_with(|| a.app_id.cmp(&b.app_id)));
    summaries
}

/// Stats for the local calendar day `day`.
pub fn stats_for_day(store: &dyn Store, day: NaiveDate) -> Result<TodayStats> {
    let (start, end) = local_day_bounds(day);
    Ok(TodayStats::from_interventions(&store.interventions_between(start, end)?))
}

pub fn today_stats(store: &dyn Store) -> Result<TodayStats> {
    stats_for_day(store, Local::now().date_naive())
}

/// Interventions for the inclusive local date range `[from, to]`, newest first.
pub fn interventions_for_days(
    store: &dyn Store,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<Intervention>> {
    let (start, _) = local_day_bounds(from);
    let (_, end) = local_day_bounds(to);
    if end <= start {
        return Err(ValidationError::InvalidTimeRange { start, end }.into());
    }
    store.interventions_between(start, end)
}
