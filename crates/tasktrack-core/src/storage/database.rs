//! SQLite-backed [`Store`].
//!
//! Provides persistent storage for:
//! - Tasks and projects
//! - Time entries
//! - Scheduled notifications
//! - Active timer snapshots (for crash recovery)
//! - Key-value store for settings

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{migrations, Config, Store, StoreResult};
use crate::clock::{Clock, SystemClock};
use crate::error::DatabaseError;
use crate::notification::{NotificationKind, ScheduledNotification};
use crate::project::{Project, ProjectPatch, ProjectStatus};
use crate::settings::Settings;
use crate::task::{Task, TaskFilter, TaskPatch, TaskPriority, TaskStatus};
use crate::timer::{ActiveTimer, TimeEntry, TimeEntryFilter};

const SETTINGS_KEY: &str = "settings";

// ── Row helpers ─────────────────────────────────────────────────────

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn format_datetime_opt(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(format_datetime)
}

fn parse_datetime(table: &'static str, id: &str, raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Corrupt {
            table,
            id: id.to_string(),
            message: format!("bad timestamp '{raw}': {e}"),
        })
}

fn parse_datetime_opt(
    table: &'static str,
    id: &str,
    raw: Option<String>,
) -> StoreResult<Option<DateTime<Utc>>> {
    raw.map(|s| parse_datetime(table, id, &s)).transpose()
}

fn corrupt(table: &'static str, id: &str, message: impl Into<String>) -> DatabaseError {
    DatabaseError::Corrupt {
        table,
        id: id.to_string(),
        message: message.into(),
    }
}

/// Task columns exactly as stored.
struct TaskRow {
    id: String,
    title: String,
    description: String,
    status: String,
    priority: String,
    project_id: Option<String>,
    start_time: Option<String>,
    due_date: Option<String>,
    estimated_duration: Option<i64>,
    time_spent: i64,
    is_timer_running: bool,
    timer_start_time: Option<String>,
    tags: String,
    created_at: String,
    updated_at: String,
}

const TASK_COLUMNS: &str = "id, title, description, status, priority, project_id, start_time,
    due_date, estimated_duration, time_spent, is_timer_running, timer_start_time, tags,
    created_at, updated_at";

impl TaskRow {
    fn read(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            status: row.get(3)?,
            priority: row.get(4)?,
            project_id: row.get(5)?,
            start_time: row.get(6)?,
            due_date: row.get(7)?,
            estimated_duration: row.get(8)?,
            time_spent: row.get(9)?,
            is_timer_running: row.get(10)?,
            timer_start_time: row.get(11)?,
            tags: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    fn decode(self) -> StoreResult<Task> {
        const T: &str = "tasks";
        let id = self.id;
        let status = TaskStatus::parse(&self.status)
            .ok_or_else(|| corrupt(T, &id, format!("unknown status '{}'", self.status)))?;
        let priority = TaskPriority::parse(&self.priority)
            .ok_or_else(|| corrupt(T, &id, format!("unknown priority '{}'", self.priority)))?;
        let tags: Vec<String> = serde_json::from_str(&self.tags)
            .map_err(|e| corrupt(T, &id, format!("bad tags: {e}")))?;
        Ok(Task {
            title: self.title,
            description: self.description,
            status,
            priority,
            project_id: self.project_id,
            start_time: parse_datetime_opt(T, &id, self.start_time)?,
            due_date: parse_datetime_opt(T, &id, self.due_date)?,
            estimated_duration: self.estimated_duration,
            time_spent: self.time_spent,
            is_timer_running: self.is_timer_running,
            timer_start_time: parse_datetime_opt(T, &id, self.timer_start_time)?,
            tags,
            created_at: parse_datetime(T, &id, &self.created_at)?,
            updated_at: parse_datetime(T, &id, &self.updated_at)?,
            id,
        })
    }
}

struct ProjectRow {
    id: String,
    name: String,
    description: String,
    color: String,
    status: String,
    start_date: Option<String>,
    end_date: Option<String>,
    total_estimated_time: i64,
    total_actual_time: i64,
    progress: i64,
    created_at: String,
    updated_at: String,
}

const PROJECT_COLUMNS: &str = "id, name, description, color, status, start_date, end_date,
    total_estimated_time, total_actual_time, progress, created_at, updated_at";

impl ProjectRow {
    fn read(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            color: row.get(3)?,
            status: row.get(4)?,
            start_date: row.get(5)?,
            end_date: row.get(6)?,
            total_estimated_time: row.get(7)?,
            total_actual_time: row.get(8)?,
            progress: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn decode(self) -> StoreResult<Project> {
        const T: &str = "projects";
        let id = self.id;
        let status = ProjectStatus::parse(&self.status)
            .ok_or_else(|| corrupt(T, &id, format!("unknown status '{}'", self.status)))?;
        Ok(Project {
            name: self.name,
            description: self.description,
            color: self.color,
            status,
            start_date: parse_datetime_opt(T, &id, self.start_date)?,
            end_date: parse_datetime_opt(T, &id, self.end_date)?,
            total_estimated_time: self.total_estimated_time,
            total_actual_time: self.total_actual_time,
            progress: self.progress.clamp(0, 100) as u8,
            created_at: parse_datetime(T, &id, &self.created_at)?,
            updated_at: parse_datetime(T, &id, &self.updated_at)?,
            id,
        })
    }
}

struct TimeEntryRow {
    id: String,
    task_id: String,
    project_id: Option<String>,
    start_time: String,
    end_time: String,
    duration: i64,
    description: String,
    created_at: String,
}

impl TimeEntryRow {
    fn read(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            task_id: row.get(1)?,
            project_id: row.get(2)?,
            start_time: row.get(3)?,
            end_time: row.get(4)?,
            duration: row.get(5)?,
            description: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn decode(self) -> StoreResult<TimeEntry> {
        const T: &str = "time_entries";
        let id = self.id;
        Ok(TimeEntry {
            task_id: self.task_id,
            project_id: self.project_id,
            start_time: parse_datetime(T, &id, &self.start_time)?,
            end_time: parse_datetime(T, &id, &self.end_time)?,
            duration: self.duration,
            description: self.description,
            created_at: parse_datetime(T, &id, &self.created_at)?,
            id,
        })
    }
}

struct NotificationRow {
    id: String,
    task_id: Option<String>,
    project_id: Option<String>,
    kind: String,
    title: String,
    message: String,
    scheduled_time: String,
    is_recurring: bool,
    recurring_interval: Option<i64>,
    is_active: bool,
    payload: String,
    created_at: String,
}

const NOTIFICATION_COLUMNS: &str = "id, task_id, project_id, kind, title, message,
    scheduled_time, is_recurring, recurring_interval, is_active, payload, created_at";

impl NotificationRow {
    fn read(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            task_id: row.get(1)?,
            project_id: row.get(2)?,
            kind: row.get(3)?,
            title: row.get(4)?,
            message: row.get(5)?,
            scheduled_time: row.get(6)?,
            is_recurring: row.get(7)?,
            recurring_interval: row.get(8)?,
            is_active: row.get(9)?,
            payload: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn decode(self) -> StoreResult<ScheduledNotification> {
        const T: &str = "notifications";
        let id = self.id;
        let kind = NotificationKind::parse(&self.kind)
            .ok_or_else(|| corrupt(T, &id, format!("unknown kind '{}'", self.kind)))?;
        let payload = serde_json::from_str(&self.payload)
            .map_err(|e| corrupt(T, &id, format!("bad payload: {e}")))?;
        Ok(ScheduledNotification {
            task_id: self.task_id,
            project_id: self.project_id,
            kind,
            title: self.title,
            message: self.message,
            scheduled_time: parse_datetime(T, &id, &self.scheduled_time)?,
            is_recurring: self.is_recurring,
            recurring_interval: self.recurring_interval,
            is_active: self.is_active,
            payload,
            created_at: parse_datetime(T, &id, &self.created_at)?,
            id,
        })
    }
}

fn decode_timer(task_id: &str, snapshot: &str) -> StoreResult<ActiveTimer> {
    serde_json::from_str(snapshot).map_err(|e| corrupt("active_timers", task_id, e.to_string()))
}

// ── Store ───────────────────────────────────────────────────────────

/// SQLite database implementing [`Store`].
///
/// A single connection behind a mutex; every call is short and never
/// holds the lock across an await point.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path` and migrate it.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DatabaseError::Unavailable(format!("{}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    /// Open the database configured in `config` (default `<data dir>/tasktrack.db`).
    pub fn open_default(config: &Config) -> crate::error::Result<Self> {
        let path = config.database_path()?;
        Ok(Self::open(&path)?)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
        })
    }

    /// Use `clock` to stamp `updated_at` on patched rows.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn load_task(conn: &Connection, id: &str) -> StoreResult<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
        conn.query_row(&sql, params![id], TaskRow::read)
            .optional()?
            .map(TaskRow::decode)
            .transpose()
    }

    fn write_task(conn: &Connection, task: &Task, insert: bool) -> StoreResult<()> {
        let tags = serde_json::to_string(&task.tags)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        let sql = if insert {
            format!(
                "INSERT INTO tasks ({TASK_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            )
        } else {
            "UPDATE tasks SET title = ?2, description = ?3, status = ?4, priority = ?5,
                project_id = ?6, start_time = ?7, due_date = ?8, estimated_duration = ?9,
                time_spent = ?10, is_timer_running = ?11, timer_start_time = ?12, tags = ?13,
                created_at = ?14, updated_at = ?15
             WHERE id = ?1"
                .to_string()
        };
        conn.execute(
            &sql,
            params![
                task.id,
                task.title,
                task.description,
                task.status.as_str(),
                task.priority.as_str(),
                task.project_id,
                format_datetime_opt(&task.start_time),
                format_datetime_opt(&task.due_date),
                task.estimated_duration,
                task.time_spent,
                task.is_timer_running,
                format_datetime_opt(&task.timer_start_time),
                tags,
                format_datetime(&task.created_at),
                format_datetime(&task.updated_at),
            ],
        )?;
        Ok(())
    }

    fn load_project(conn: &Connection, id: &str) -> StoreResult<Option<Project>> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1");
        conn.query_row(&sql, params![id], ProjectRow::read)
            .optional()?
            .map(ProjectRow::decode)
            .transpose()
    }

    fn write_project(conn: &Connection, project: &Project, insert: bool) -> StoreResult<()> {
        let sql = if insert {
            format!(
                "INSERT INTO projects ({PROJECT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            )
        } else {
            "UPDATE projects SET name = ?2, description = ?3, color = ?4, status = ?5,
                start_date = ?6, end_date = ?7, total_estimated_time = ?8,
                total_actual_time = ?9, progress = ?10, created_at = ?11, updated_at = ?12
             WHERE id = ?1"
                .to_string()
        };
        conn.execute(
            &sql,
            params![
                project.id,
                project.name,
                project.description,
                project.color,
                project.status.as_str(),
                format_datetime_opt(&project.start_date),
                format_datetime_opt(&project.end_date),
                project.total_estimated_time,
                project.total_actual_time,
                project.progress,
                format_datetime(&project.created_at),
                format_datetime(&project.updated_at),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    // ── Tasks ──

    async fn get_task(&self, id: &str) -> StoreResult<Option<Task>> {
        Self::load_task(&self.conn(), id)
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>> {
        let conn = self.conn();
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at, id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], TaskRow::read)?;
        let mut tasks = Vec::new();
        for row in rows {
            let task = row?.decode()?;
            if filter.matches(&task) {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    async fn create_task(&self, task: &Task) -> StoreResult<()> {
        Self::write_task(&self.conn(), task, true)
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> StoreResult<Option<Task>> {
        let now = self.clock.now();
        let conn = self.conn();
        let Some(mut task) = Self::load_task(&conn, id)? else {
            return Ok(None);
        };
        task.apply(patch, now);
        Self::write_task(&conn, &task, false)?;
        Ok(Some(task))
    }

    async fn delete_task(&self, id: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM time_entries WHERE task_id = ?1", params![id])?;
        let removed = tx.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    // ── Projects ──

    async fn get_project(&self, id: &str) -> StoreResult<Option<Project>> {
        Self::load_project(&self.conn(), id)
    }

    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let conn = self.conn();
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at, id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], ProjectRow::read)?;
        let projects = rows.map(|row| row?.decode()).collect();
        projects
    }

    async fn create_project(&self, project: &Project) -> StoreResult<()> {
        Self::write_project(&self.conn(), project, true)
    }

    async fn update_project(
        &self,
        id: &str,
        patch: &ProjectPatch,
    ) -> StoreResult<Option<Project>> {
        let now = self.clock.now();
        let conn = self.conn();
        let Some(mut project) = Self::load_project(&conn, id)? else {
            return Ok(None);
        };
        project.apply(patch, now);
        Self::write_project(&conn, &project, false)?;
        Ok(Some(project))
    }

    async fn delete_project(&self, id: &str) -> StoreResult<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    // ── Time entries ──

    async fn create_time_entry(&self, entry: &TimeEntry) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO time_entries
                (id, task_id, project_id, start_time, end_time, duration, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.task_id,
                entry.project_id,
                format_datetime(&entry.start_time),
                format_datetime(&entry.end_time),
                entry.duration,
                entry.description,
                format_datetime(&entry.created_at),
            ],
        )?;
        Ok(())
    }

    async fn list_time_entries(&self, filter: &TimeEntryFilter) -> StoreResult<Vec<TimeEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, project_id, start_time, end_time, duration, description, created_at
             FROM time_entries
             WHERE (?1 IS NULL OR task_id = ?1) AND (?2 IS NULL OR project_id = ?2)
             ORDER BY start_time, id",
        )?;
        let rows = stmt.query_map(
            params![filter.task_id, filter.project_id],
            TimeEntryRow::read,
        )?;
        let entries = rows.map(|row| row?.decode()).collect();
        entries
    }

    // ── Notifications ──

    async fn get_notification(&self, id: &str) -> StoreResult<Option<ScheduledNotification>> {
        let conn = self.conn();
        let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1");
        conn.query_row(&sql, params![id], NotificationRow::read)
            .optional()?
            .map(NotificationRow::decode)
            .transpose()
    }

    async fn list_notifications(
        &self,
        active_only: bool,
    ) -> StoreResult<Vec<ScheduledNotification>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE (?1 = 0 OR is_active = 1)
             ORDER BY scheduled_time, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![active_only], NotificationRow::read)?;
        let notifications = rows.map(|row| row?.decode()).collect();
        notifications
    }

    async fn upsert_notification(&self, n: &ScheduledNotification) -> StoreResult<()> {
        let payload =
            serde_json::to_string(&n.payload).map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        let sql = format!(
            "INSERT OR REPLACE INTO notifications ({NOTIFICATION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        );
        self.conn().execute(
            &sql,
            params![
                n.id,
                n.task_id,
                n.project_id,
                n.kind.as_str(),
                n.title,
                n.message,
                format_datetime(&n.scheduled_time),
                n.is_recurring,
                n.recurring_interval,
                n.is_active,
                payload,
                format_datetime(&n.created_at),
            ],
        )?;
        Ok(())
    }

    async fn deactivate_notification(&self, id: &str) -> StoreResult<bool> {
        let changed = self.conn().execute(
            "UPDATE notifications SET is_active = 0 WHERE id = ?1 AND is_active = 1",
            params![id],
        )?;
        Ok(changed > 0)
    }

    // ── Active timers ──

    async fn get_active_timer(&self, task_id: &str) -> StoreResult<Option<ActiveTimer>> {
        let conn = self.conn();
        let snapshot = conn
            .query_row(
                "SELECT snapshot FROM active_timers WHERE task_id = ?1",
                params![task_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        snapshot.map(|s| decode_timer(task_id, &s)).transpose()
    }

    async fn list_active_timers(&self) -> StoreResult<Vec<ActiveTimer>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT task_id, snapshot FROM active_timers ORDER BY task_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let timers = rows
            .map(|row| {
                let (task_id, snapshot) = row?;
                decode_timer(&task_id, &snapshot)
            })
            .collect();
        timers
    }

    async fn set_active_timer(&self, timer: &ActiveTimer) -> StoreResult<()> {
        let snapshot =
            serde_json::to_string(timer).map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        self.conn().execute(
            "INSERT OR REPLACE INTO active_timers (task_id, snapshot) VALUES (?1, ?2)",
            params![timer.task_id, snapshot],
        )?;
        Ok(())
    }

    async fn remove_active_timer(&self, task_id: &str) -> StoreResult<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM active_timers WHERE task_id = ?1", params![task_id])?;
        Ok(removed > 0)
    }

    // ── Settings ──

    async fn get_settings(&self) -> StoreResult<Settings> {
        match self.kv_get(SETTINGS_KEY)? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| corrupt("kv", SETTINGS_KEY, e.to_string())),
            None => Ok(Settings::default()),
        }
    }

    async fn update_settings(&self, settings: &Settings) -> StoreResult<()> {
        let raw = serde_json::to_string(settings)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        self.kv_set(SETTINGS_KEY, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notification::NotificationRequest;
    use crate::project::NewProject;
    use crate::task::NewTask;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn store() -> SqliteStore {
        SqliteStore::open_memory()
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(t0())))
    }

    #[tokio::test]
    async fn task_round_trip_preserves_fields() {
        let db = store();
        let mut new = NewTask::titled("Write report");
        new.priority = TaskPriority::High;
        new.due_date = Some(t0() + Duration::hours(3));
        new.estimated_duration = Some(90);
        new.tags = vec!["writing".into()];
        let task = new.into_task(t0());
        db.create_task(&task).await.unwrap();

        let loaded = db.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(loaded, task);
        assert!(db.get_task("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_task_stamps_updated_at_with_clock() {
        let clock = ManualClock::new(t0());
        let db = SqliteStore::open_memory()
            .unwrap()
            .with_clock(Arc::new(clock.clone()));
        let task = NewTask::titled("a").into_task(t0());
        db.create_task(&task).await.unwrap();

        clock.advance_minutes(10);
        let patch = TaskPatch {
            time_spent: Some(25),
            is_timer_running: Some(true),
            timer_start_time: Some(Some(t0())),
            ..TaskPatch::default()
        };
        let updated = db.update_task(&task.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.time_spent, 25);
        assert_eq!(updated.updated_at, t0() + Duration::minutes(10));
        assert_eq!(db.get_task(&task.id).await.unwrap().unwrap(), updated);

        assert!(db.update_task("missing", &patch).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_tasks_applies_filter() {
        let db = store();
        let mut a = NewTask::titled("a");
        a.project_id = Some("p1".into());
        let a = a.into_task(t0());
        let b = NewTask::titled("b").into_task(t0());
        db.create_task(&a).await.unwrap();
        db.create_task(&b).await.unwrap();

        let all = db.list_tasks(&TaskFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        let in_p1 = db.list_tasks(&TaskFilter::by_project("p1")).await.unwrap();
        assert_eq!(in_p1.len(), 1);
        assert_eq!(in_p1[0].id, a.id);
    }

    #[tokio::test]
    async fn delete_task_removes_its_time_entries() {
        let db = store();
        let task = NewTask::titled("a").into_task(t0());
        db.create_task(&task).await.unwrap();
        let entry = TimeEntry::for_segment(&task.id, None, t0(), t0() + Duration::minutes(30));
        db.create_time_entry(&entry).await.unwrap();

        assert!(db.delete_task(&task.id).await.unwrap());
        assert!(!db.delete_task(&task.id).await.unwrap());
        let left = db
            .list_time_entries(&TimeEntryFilter::by_task(&task.id))
            .await
            .unwrap();
        assert!(left.is_empty());
    }

    #[tokio::test]
    async fn project_update_applies_derived_totals() {
        let db = store();
        let project = NewProject::named("Launch").into_project(t0());
        db.create_project(&project).await.unwrap();

        let patch = ProjectPatch::derived(crate::project::DerivedTotals {
            progress: 50,
            total_estimated_time: 120,
            total_actual_time: 45,
        });
        let updated = db.update_project(&project.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.progress, 50);
        assert_eq!(updated.total_actual_time, 45);
        assert_eq!(db.list_projects().await.unwrap(), vec![updated]);
        assert!(db.delete_project(&project.id).await.unwrap());
    }

    #[tokio::test]
    async fn upsert_notification_replaces_by_id() {
        let db = store();
        let first = NotificationRequest::new(
            NotificationKind::TaskDue,
            "task_due_t1",
            "Task Due Soon",
            "first",
            t0() + Duration::hours(1),
        )
        .for_task("t1", None)
        .into_record(t0());
        db.upsert_notification(&first).await.unwrap();

        let mut second = first.clone();
        second.message = "second".into();
        db.upsert_notification(&second).await.unwrap();

        let all = db.list_notifications(false).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].message, "second");

        assert!(db.deactivate_notification("task_due_t1").await.unwrap());
        assert!(!db.deactivate_notification("task_due_t1").await.unwrap());
        let mut inactive = second.clone();
        inactive.is_active = false;
        assert!(db.list_notifications(true).await.unwrap().is_empty());
        assert_eq!(
            db.get_notification("task_due_t1").await.unwrap(),
            Some(inactive)
        );
    }

    #[tokio::test]
    async fn active_timer_snapshots_round_trip() {
        let db = store();
        let task = NewTask::titled("a").into_task(t0());
        let timer = ActiveTimer::started(&task, t0());
        db.set_active_timer(&timer).await.unwrap();
        assert_eq!(db.list_active_timers().await.unwrap(), vec![timer.clone()]);
        assert_eq!(db.get_active_timer(&task.id).await.unwrap(), Some(timer));
        assert!(db.remove_active_timer(&task.id).await.unwrap());
        assert!(!db.remove_active_timer(&task.id).await.unwrap());
    }

    #[tokio::test]
    async fn settings_default_until_written() {
        let db = store();
        assert_eq!(db.get_settings().await.unwrap(), Settings::default());
        let mut settings = Settings::default();
        settings.notifications.enabled = false;
        db.update_settings(&settings).await.unwrap();
        assert_eq!(db.get_settings().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("tasktrack.db");
        let task = NewTask::titled("persist me").into_task(t0());
        {
            let db = SqliteStore::open(&path).unwrap();
            db.create_task(&task).await.unwrap();
        }
        let db = SqliteStore::open(&path).unwrap();
        assert_eq!(db.get_task(&task.id).await.unwrap(), Some(task));
    }

    #[test]
    fn kv_store() {
        let db = store();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
    }
}
