//! Database schema migrations for tasktrack.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const CURRENT_VERSION: i32 = 2;

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
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// v1: base tables.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tasks (
            id                  TEXT PRIMARY KEY,
            title               TEXT NOT NULL,
            description         TEXT NOT NULL DEFAULT '',
            status              TEXT NOT NULL DEFAULT 'pending',
            priority            TEXT NOT NULL DEFAULT 'medium',
            project_id          TEXT,
            start_time          TEXT,
            due_date            TEXT,
            estimated_duration  INTEGER,
            time_spent          INTEGER NOT NULL DEFAULT 0,
            is_timer_running    INTEGER NOT NULL DEFAULT 0,
            timer_start_time    TEXT,
            tags                TEXT NOT NULL DEFAULT '[]',
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS projects (
            id                    TEXT PRIMARY KEY,
            name                  TEXT NOT NULL,
            description           TEXT NOT NULL DEFAULT '',
            color                 TEXT NOT NULL,
            status                TEXT NOT NULL DEFAULT 'active',
            start_date            TEXT,
            end_date              TEXT,
            total_estimated_time  INTEGER NOT NULL DEFAULT 0,
            total_actual_time     INTEGER NOT NULL DEFAULT 0,
            progress              INTEGER NOT NULL DEFAULT 0,
            created_at            TEXT NOT NULL,
            updated_at            TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS time_entries (
            id           TEXT PRIMARY KEY,
            task_id      TEXT NOT NULL,
            project_id   TEXT,
            start_time   TEXT NOT NULL,
            end_time     TEXT NOT NULL,
            duration     INTEGER NOT NULL,
            description  TEXT NOT NULL DEFAULT '',
            created_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id                  TEXT PRIMARY KEY,
            task_id             TEXT,
            project_id          TEXT,
            kind                TEXT NOT NULL,
            title               TEXT NOT NULL,
            message             TEXT NOT NULL,
            scheduled_time      TEXT NOT NULL,
            is_recurring        INTEGER NOT NULL DEFAULT 0,
            recurring_interval  INTEGER,
            is_active           INTEGER NOT NULL DEFAULT 1,
            payload             TEXT NOT NULL DEFAULT '{}',
            created_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS active_timers (
            task_id     TEXT PRIMARY KEY,
            snapshot    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    set_schema_version(conn, 1)
}

/// v2: indexes for the per-task/per-project lookups the engine does on every stop.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_tasks_project_id ON tasks(project_id);
        CREATE INDEX IF NOT EXISTS idx_time_entries_task_id ON time_entries(task_id);
        CREATE INDEX IF NOT EXISTS idx_time_entries_project_id ON time_entries(project_id);
        CREATE INDEX IF NOT EXISTS idx_notifications_active ON notifications(is_active);",
    )?;
    set_schema_version(conn, 2)
}
