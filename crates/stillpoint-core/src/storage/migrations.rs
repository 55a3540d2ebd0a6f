//! Database schema migrations for stillpoint.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::warn;

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: guarded apps, settings singleton, intervention log, content library.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS guarded_apps (
            identifier   TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            is_active    INTEGER NOT NULL DEFAULT 1,
            added_at     INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_settings (
            id              INTEGER PRIMARY KEY CHECK (id = 1),
            schedule_mode   TEXT NOT NULL DEFAULT 'always',
            custom_schedule TEXT,
            sabbath_day     TEXT NOT NULL DEFAULT 'Sun',
            snooze_until    INTEGER,
            is_premium      INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS interventions (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp      INTEGER NOT NULL,
            source_type    TEXT NOT NULL DEFAULT 'app',
            source_id      TEXT NOT NULL,
            source_name    TEXT NOT NULL,
            outcome        TEXT NOT NULL,
            scripture_ref  TEXT NOT NULL,
            pause_duration INTEGER NOT NULL,
            attempt_number INTEGER NOT NULL,
            time_saved_est INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS daily_content (
            season           TEXT NOT NULL,
            day_in_season    INTEGER NOT NULL,
            liturgical_label TEXT,
            scripture_ref    TEXT NOT NULL,
            scripture_text   TEXT NOT NULL,
            breath_prayer    TEXT NOT NULL,
            reflection       TEXT NOT NULL,
            companion_name   TEXT,
            companion_quote  TEXT,
            PRIMARY KEY (season, day_in_season)
        );

        CREATE INDEX IF NOT EXISTS idx_interventions_timestamp ON interventions(timestamp);
        CREATE INDEX IF NOT EXISTS idx_interventions_source_timestamp ON interventions(source_id, timestamp);",
    )?;

    set_schema_version(conn, 1)?;
    Ok(())
}

/// Migration v2: personal commitment shown on the reflection screen.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let has_column: bool = conn
        .prepare("SELECT 1 FROM pragma_table_info('user_settings') WHERE name = 'personal_commitment'")?
        .exists([])?;

    if !has_column {
        conn.execute_batch("ALTER TABLE user_settings ADD COLUMN personal_commitment TEXT;")?;
    }

    set_schema_version(conn, 2)?;
    Ok(())
}
