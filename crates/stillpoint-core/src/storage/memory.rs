//! In-memory [`Store`] for tests and simulation hosts.
//!
//! Supports switching into a failing mode so callers can exercise the
//! "storage unavailable" paths without a real database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};

use super::{local_day_bounds, Store};
use crate::content::{DailyContent, Season};
use crate::error::{DatabaseError, Result};
use crate::types::{GuardedApp, Intervention, NewIntervention, Settings};

#[derive(Default)]
struct Inner {
    apps: HashMap<String, GuardedApp>,
    settings: Option<Settings>,
    interventions: Vec<Intervention>,
    content: HashMap<(Season, u32), DailyContent>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    failing: AtomicBool,
    app_loads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> Result<MutexGuard<'_, Inner>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DatabaseError::Unavailable("memory store set to fail".into()).into());
        }
        Ok(self.inner.lock().map_err(|_| DatabaseError::Poisoned)?)
    }

    /// While set, every call returns [`DatabaseError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// How many times `active_guarded_apps` has been called.
    pub fn app_loads(&self) -> usize {
        self.app_loads.load(Ordering::SeqCst)
    }

    pub fn upsert_guarded_app(&self, app: GuardedApp) -> Result<()> {
        self.inner()?.apps.insert(app.identifier.clone(), app);
        Ok(())
    }

    pub fn remove_guarded_app(&self, identifier: &str) -> Result<bool> {
        Ok(self.inner()?.apps.remove(identifier).is_some())
    }

    pub fn update_settings(&self, settings: Settings) -> Result<()> {
        self.inner()?.settings = Some(settings);
        Ok(())
    }

    pub fn seed_daily_content(&self, content: DailyContent) -> Result<()> {
        self.inner()?
            .content
            .insert((content.season, content.day_in_season), content);
        Ok(())
    }

    /// Every logged intervention, oldest first.
    pub fn interventions(&self) -> Result<Vec<Intervention>> {
        Ok(self.inner()?.interventions.clone())
    }
}

impl Store for MemoryStore {
    fn active_guarded_apps(&self) -> Result<Vec<GuardedApp>> {
        self.app_loads.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner()?;
        Ok(inner.apps.values().filter(|a| a.is_active).cloned().collect())
    }

    fn settings(&self) -> Result<Settings> {
        let mut inner = self.inner()?;
        Ok(inner.settings.get_or_insert_with(Settings::default).clone())
    }

    fn set_snooze_until(&self, until: Option<DateTime<Utc>>) -> Result<()> {
        let mut inner = self.inner()?;
        inner.settings.get_or_insert_with(Settings::default).snooze_until = until;
        Ok(())
    }

    fn today_attempt_count(&self, app_id: &str, day: NaiveDate) -> Result<u32> {
        let (start, end) = local_day_bounds(day);
        let inner = self.inner()?;
        let count = inner
            .interventions
            .iter()
            .filter(|i| i.source_identifier == app_id && i.timestamp >= start && i.timestamp < end)
            .count();
        Ok(count as u32)
    }

    fn append_intervention(&self, record: &NewIntervention) -> Result<i64> {
        let mut inner = self.inner()?;
        let id = inner.interventions.len() as i64 + 1;
        inner.interventions.push(Intervention::from_new(id, record.clone()));
        Ok(id)
    }

    fn interventions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Intervention>> {
        let inner = self.inner()?;
        let mut rows: Vec<_> = inner
            .interventions
            .iter()
            .filter(|i| i.timestamp >= start && i.timestamp < end)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    fn daily_content(&self, season: Season, day_in_season: u32) -> Result<Option<DailyContent>> {
        Ok(self.inner()?.content.get(&(season, day_in_season)).cloned())
    }
}
