//! SQLite-backed persistence.
//!
//! Provides persistent storage for:
//! - Guarded apps and the settings singleton
//! - The append-only intervention log
//! - The seeded daily-content library

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, TimeZone, Utc, Weekday};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::{data_dir, local_day_bounds, migrations, Store};
use crate::content::{DailyContent, Season};
use crate::error::{DatabaseError, Result};
use crate::types::{
    CustomSchedule, GuardedApp, Intervention, NewIntervention, Outcome, ScheduleMode, Settings,
};

/// SQLite database for guard state and the intervention log.
///
/// The connection sits behind a mutex so the store can be shared between
/// the service loop and blocking workers.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `<data_dir>/stillpoint.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("stillpoint.db");
        Self::open_at(&path)
    }

    /// Open (creating if needed) a database file at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::Poisoned)
    }

    // ── Guarded apps ─────────────────────────────────────────────────

    /// Insert or replace a guarded app.
    pub fn upsert_guarded_app(&self, app: &GuardedApp) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO guarded_apps (identifier, display_name, is_active, added_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                app.identifier,
                app.display_name,
                app.is_active,
                app.added_at.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    /// Replace the whole guarded set with `apps`.
    pub fn set_guarded_apps(&self, apps: &[GuardedApp]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM guarded_apps", [])?;
        for app in apps {
            tx.execute(
                "INSERT OR REPLACE INTO guarded_apps (identifier, display_name, is_active, added_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    app.identifier,
                    app.display_name,
                    app.is_active,
                    app.added_at.timestamp_millis()
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Guard or unguard a single app. Unguarding removes the row.
    pub fn toggle_guarded_app(&self, identifier: &str, display_name: &str, active: bool) -> Result<()> {
        if !active {
            return self.remove_guarded_app(identifier).map(|_| ());
        }
        match self.guarded_app(identifier)? {
            Some(existing) => self.upsert_guarded_app(&GuardedApp { is_active: true, ..existing }),
            None => self.upsert_guarded_app(&GuardedApp::new(identifier, display_name)),
        }
    }

    /// Returns true if a row was deleted.
    pub fn remove_guarded_app(&self, identifier: &str) -> Result<bool> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM guarded_apps WHERE identifier = ?1", params![identifier])?;
        Ok(deleted > 0)
    }

    pub fn guarded_app(&self, identifier: &str) -> Result<Option<GuardedApp>> {
        let conn = self.conn()?;
        let app = conn
            .query_row(
                "SELECT identifier, display_name, is_active, added_at
                 FROM guarded_apps WHERE identifier = ?1",
                params![identifier],
                row_to_guarded_app,
            )
            .optional()?;
        Ok(app)
    }

    pub fn all_guarded_apps(&self) -> Result<Vec<GuardedApp>> {
        self.query_guarded_apps(
            "SELECT identifier, display_name, is_active, added_at
             FROM guarded_apps ORDER BY display_name",
        )
    }

    fn query_guarded_apps(&self, sql: &str) -> Result<Vec<GuardedApp>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], row_to_guarded_app)?;
        let apps = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(apps)
    }

    // ── Settings ─────────────────────────────────────────────────────

    /// Overwrite the settings singleton.
    pub fn update_settings(&self, settings: &Settings) -> Result<()> {
        let custom = serde_json::to_string(&settings.custom_schedule)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO user_settings
                (id, schedule_mode, custom_schedule, sabbath_day, snooze_until, is_premium, personal_commitment)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                settings.schedule_mode.as_str(),
                custom,
                settings.sabbath_day.to_string(),
                settings.snooze_until.map(|t| t.timestamp_millis()),
                settings.is_premium,
                settings.personal_commitment,
            ],
        )?;
        Ok(())
    }

    pub fn set_personal_commitment(&self, commitment: Option<&str>) -> Result<()> {
        let mut settings = self.settings()?;
        settings.personal_commitment = commitment.map(str::to_string);
        self.update_settings(&settings)
    }

    // ── Content ──────────────────────────────────────────────────────

    /// Insert or replace content library entries.
    pub fn seed_daily_content(&self, contents: &[DailyContent]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for c in contents {
            tx.execute(
                "INSERT OR REPLACE INTO daily_content
                    (season, day_in_season, liturgical_label, scripture_ref, scripture_text,
                     breath_prayer, reflection, companion_name, companion_quote)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    c.season.as_str(),
                    c.day_in_season,
                    c.liturgical_label,
                    c.scripture_reference,
                    c.scripture_text,
                    c.breath_prayer,
                    c.reflection,
                    c.companion_name,
                    c.companion_quote,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl Store for Database {
    fn active_guarded_apps(&self) -> Result<Vec<GuardedApp>> {
        self.query_guarded_apps(
            "SELECT identifier, display_name, is_active, added_at
             FROM guarded_apps WHERE is_active = 1",
        )
    }

    fn settings(&self) -> Result<Settings> {
        let conn = self.conn()?;
        let existing = conn
            .query_row(
                "SELECT schedule_mode, custom_schedule, sabbath_day, snooze_until, is_premium,
                        personal_commitment
                 FROM user_settings WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;
        drop(conn);

        let Some((mode, custom, sabbath, snooze, premium, commitment)) = existing else {
            let settings = Settings::default();
            self.update_settings(&settings)?;
            debug!("created default settings row");
            return Ok(settings);
        };

        let custom_schedule = match custom {
            Some(json) => serde_json::from_str::<CustomSchedule>(&json).map_err(|_| {
                DatabaseError::CorruptValue { column: "custom_schedule".into(), value: json }
            })?,
            None => CustomSchedule::default(),
        };
        let sabbath_day = sabbath.parse::<Weekday>().unwrap_or(Weekday::Sun);

        Ok(Settings {
            schedule_mode: ScheduleMode::from_stored(&mode),
            custom_schedule,
            sabbath_day,
            snooze_until: snooze.and_then(millis_to_utc),
            personal_commitment: commitment,
            is_premium: premium,
        })
    }

    fn set_snooze_until(&self, until: Option<DateTime<Utc>>) -> Result<()> {
        // Make sure the singleton exists before updating a column of it.
        self.settings()?;
        self.conn()?.execute(
            "UPDATE user_settings SET snooze_until = ?1 WHERE id = 1",
            params![until.map(|t| t.timestamp_millis())],
        )?;
        Ok(())
    }

    fn today_attempt_count(&self, app_id: &str, day: NaiveDate) -> Result<u32> {
        let (start, end) = local_day_bounds(day);
        let count = self.conn()?.query_row(
            "SELECT COUNT(*) FROM interventions
             WHERE source_id = ?1 AND timestamp >= ?2 AND timestamp < ?3",
            params![app_id, start.timestamp_millis(), end.timestamp_millis()],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(count)
    }

    fn append_intervention(&self, record: &NewIntervention) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO interventions
                (timestamp, source_type, source_id, source_name, outcome, scripture_ref,
                 pause_duration, attempt_number, time_saved_est)
             VALUES (?1, 'app', ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.timestamp.timestamp_millis(),
                record.source_identifier,
                record.source_name,
                record.outcome.as_str(),
                record.scripture_reference,
                record.pause_duration_secs,
                record.attempt_number,
                record.estimated_time_saved_secs,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn interventions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Intervention>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, source_id, source_name, outcome, scripture_ref,
                    pause_duration, attempt_number, time_saved_est
             FROM interventions
             WHERE timestamp >= ?1 AND timestamp < ?2
             ORDER BY timestamp DESC, id DESC",
        )?;
        let rows = stmt.query_map(
            params![start.timestamp_millis(), end.timestamp_millis()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, u32>(6)?,
                    row.get::<_, u32>(7)?,
                    row.get::<_, u32>(8)?,
                ))
            },
        )?;

        let mut interventions = Vec::new();
        for row in rows {
            let (id, ts, source_id, source_name, outcome, scripture, pause, attempt, saved) = row?;
            let outcome = outcome.parse::<Outcome>().map_err(|_| DatabaseError::CorruptValue {
                column: "outcome".into(),
                value: outcome.clone(),
            })?;
            interventions.push(Intervention {
                id,
                timestamp: millis_to_utc(ts).unwrap_or_default(),
                source_identifier: source_id,
                source_name,
                outcome,
                scripture_reference: scripture,
                pause_duration_secs: pause,
                attempt_number: attempt,
                estimated_time_saved_secs: saved,
            });
        }
        Ok(interventions)
    }

    fn daily_content(&self, season: Season, day_in_season: u32) -> Result<Option<DailyContent>> {
        let conn = self.conn()?;
        let content = conn
            .query_row(
                "SELECT liturgical_label, scripture_ref, scripture_text, breath_prayer, reflection,
                        companion_name, companion_quote
                 FROM daily_content WHERE season = ?1 AND day_in_season = ?2",
                params![season.as_str(), day_in_season],
                |row| {
                    Ok(DailyContent {
                        season,
                        day_in_season,
                        liturgical_label: row.get(0)?,
                        scripture_reference: row.get(1)?,
                        scripture_text: row.get(2)?,
                        breath_prayer: row.get(3)?,
                        reflection: row.get(4)?,
                        companion_name: row.get(5)?,
                        companion_quote: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(content)
    }
}

fn row_to_guarded_app(row: &Row<'_>) -> rusqlite::Result<GuardedApp> {
    Ok(GuardedApp {
        identifier: row.get(0)?,
        display_name: row.get(1)?,
        is_active: row.get(2)?,
        added_at: millis_to_utc(row.get::<_, i64>(3)?).unwrap_or_default(),
    })
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Local};

    fn record(app: &str, at: DateTime<Utc>, attempt: u32) -> NewIntervention {
        NewIntervention {
            timestamp: at,
            source_identifier: app.into(),
            source_name: app.to_uppercase(),
            outcome: Outcome::Resisted,
            scripture_reference: "Psalm 46:10".into(),
            pause_duration_secs: 2,
            attempt_number: attempt,
            estimated_time_saved_secs: 300,
        }
    }

    #[test]
    fn settings_created_on_first_access() {
        let db = Database::open_memory().unwrap();
        let settings = db.settings().unwrap();
        assert_eq!(settings, Settings::default());
        // Second read comes from the row.
        assert_eq!(db.settings().unwrap(), settings);
    }

    #[test]
    fn settings_roundtrip_through_row() {
        let db = Database::open_memory().unwrap();
        let settings = Settings {
            schedule_mode: ScheduleMode::Custom,
            custom_schedule: CustomSchedule {
                start_minute: 60,
                end_minute: 120,
                days: vec![Weekday::Sat],
            },
            sabbath_day: Weekday::Sat,
            snooze_until: Some(Utc.timestamp_millis_opt(1_800_000_000_000).unwrap()),
            personal_commitment: Some("phone stays downstairs".into()),
            is_premium: true,
        };
        db.update_settings(&settings).unwrap();
        assert_eq!(db.settings().unwrap(), settings);
    }

    #[test]
    fn unknown_stored_mode_loads_as_unrecognized() {
        let db = Database::open_memory().unwrap();
        db.settings().unwrap();
        db.conn()
            .unwrap()
            .execute("UPDATE user_settings SET schedule_mode = 'lunar' WHERE id = 1", [])
            .unwrap();
        assert_eq!(db.settings().unwrap().schedule_mode, ScheduleMode::Unrecognized);
    }

    #[test]
    fn snooze_set_and_clear() {
        let db = Database::open_memory().unwrap();
        let until = Utc.timestamp_millis_opt(1_800_000_000_000).unwrap();
        db.set_snooze_until(Some(until)).unwrap();
        assert_eq!(db.settings().unwrap().snooze_until, Some(until));
        db.set_snooze_until(None).unwrap();
        assert_eq!(db.settings().unwrap().snooze_until, None);
    }

    #[test]
    fn active_subset_only() {
        let db = Database::open_memory().unwrap();
        db.upsert_guarded_app(&GuardedApp::new("photo.app", "Photo")).unwrap();
        db.upsert_guarded_app(&GuardedApp {
            is_active: false,
            ..GuardedApp::new("video.app", "Video")
        })
        .unwrap();

        let active = db.active_guarded_apps().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].identifier, "photo.app");
        assert_eq!(db.all_guarded_apps().unwrap().len(), 2);
    }

    #[test]
    fn toggle_off_removes_app() {
        let db = Database::open_memory().unwrap();
        db.toggle_guarded_app("photo.app", "Photo", true).unwrap();
        assert!(db.guarded_app("photo.app").unwrap().is_some());
        db.toggle_guarded_app("photo.app", "Photo", false).unwrap();
        assert!(db.guarded_app("photo.app").unwrap().is_none());
    }

    #[test]
    fn set_guarded_apps_replaces_everything() {
        let db = Database::open_memory().unwrap();
        db.upsert_guarded_app(&GuardedApp::new("old.app", "Old")).unwrap();
        db.set_guarded_apps(&[GuardedApp::new("new.app", "New")]).unwrap();
        let all = db.all_guarded_apps().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].identifier, "new.app");
    }

    #[test]
    fn attempt_count_is_per_app_and_day() {
        let db = Database::open_memory().unwrap();
        let noon = Local.with_ymd_and_hms(2026, 6, 10, 12, 0, 0).unwrap();
        let day = noon.date_naive();
        let utc = noon.with_timezone(&Utc);

        db.append_intervention(&record("photo.app", utc, 1)).unwrap();
        db.append_intervention(&record("photo.app", utc + Duration::minutes(5), 2))
            .unwrap();
        db.append_intervention(&record("video.app", utc, 1)).unwrap();
        db.append_intervention(&record("photo.app", utc + Duration::days(1), 1))
            .unwrap();

        assert_eq!(db.today_attempt_count("photo.app", day).unwrap(), 2);
        assert_eq!(db.today_attempt_count("video.app", day).unwrap(), 1);
        assert_eq!(db.today_attempt_count("mail.app", day).unwrap(), 0);
    }

    #[test]
    fn range_query_is_newest_first() {
        let db = Database::open_memory().unwrap();
        let base = Utc.timestamp_millis_opt(1_750_000_000_000).unwrap();
        let first = db.append_intervention(&record("a", base, 1)).unwrap();
        let second = db
            .append_intervention(&record("a", base + Duration::minutes(1), 2))
            .unwrap();

        let rows = db
            .interventions_between(base, base + Duration::hours(1))
            .unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![second, first]);
        assert!(db
            .interventions_between(base + Duration::hours(1), base + Duration::hours(2))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn content_library_lookup() {
        let db = Database::open_memory().unwrap();
        let entry = DailyContent {
            season: Season::Lent,
            day_in_season: 1,
            liturgical_label: Some("Ash Wednesday".into()),
            scripture_reference: "Joel 2:13".into(),
            scripture_text: "Rend your heart and not your garments.".into(),
            breath_prayer: "Return to me.".into(),
            reflection: "Begin again.".into(),
            companion_name: None,
            companion_quote: None,
        };
        db.seed_daily_content(std::slice::from_ref(&entry)).unwrap();
        assert_eq!(db.daily_content(Season::Lent, 1).unwrap(), Some(entry));
        assert_eq!(db.daily_content(Season::Lent, 2).unwrap(), None);
    }
}
