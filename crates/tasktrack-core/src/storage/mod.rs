//! Persistent store contract and its SQLite implementation.
//!
//! The engine only talks to [`Store`]; [`SqliteStore`] is the shipped
//! adapter. All reads/writes are single-writer-per-key from the engine's
//! point of view.

pub(crate) mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, LoggingConfig, NotificationsConfig, StorageConfig, TimerConfig};
pub use database::SqliteStore;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{ConfigError, DatabaseError};
use crate::notification::ScheduledNotification;
use crate::project::{Project, ProjectPatch};
use crate::settings::Settings;
use crate::task::{Task, TaskFilter, TaskPatch};
use crate::timer::{ActiveTimer, TimeEntry, TimeEntryFilter};

pub type StoreResult<T> = Result<T, DatabaseError>;

/// CRUD contract consumed by the engine.
///
/// `update_*` return `Ok(None)` when the id does not exist; `delete_*` and
/// `remove_*` return whether a row was removed.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_task(&self, id: &str) -> StoreResult<Option<Task>>;
    async fn list_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>>;
    async fn create_task(&self, task: &Task) -> StoreResult<()>;
    async fn update_task(&self, id: &str, patch: &TaskPatch) -> StoreResult<Option<Task>>;
    /// Also removes the task's time entries.
    async fn delete_task(&self, id: &str) -> StoreResult<bool>;

    async fn get_project(&self, id: &str) -> StoreResult<Option<Project>>;
    async fn list_projects(&self) -> StoreResult<Vec<Project>>;
    async fn create_project(&self, project: &Project) -> StoreResult<()>;
    async fn update_project(&self, id: &str, patch: &ProjectPatch)
        -> StoreResult<Option<Project>>;
    async fn delete_project(&self, id: &str) -> StoreResult<bool>;

    async fn create_time_entry(&self, entry: &TimeEntry) -> StoreResult<()>;
    async fn list_time_entries(&self, filter: &TimeEntryFilter) -> StoreResult<Vec<TimeEntry>>;

    async fn get_notification(&self, id: &str) -> StoreResult<Option<ScheduledNotification>>;
    async fn list_notifications(&self, active_only: bool)
        -> StoreResult<Vec<ScheduledNotification>>;
    /// Insert or fully replace the record with the same id.
    async fn upsert_notification(&self, notification: &ScheduledNotification)
        -> StoreResult<()>;
    /// Mark a record inactive. Returns false if it was unknown or already inactive.
    async fn deactivate_notification(&self, id: &str) -> StoreResult<bool>;

    async fn get_active_timer(&self, task_id: &str) -> StoreResult<Option<ActiveTimer>>;
    async fn list_active_timers(&self) -> StoreResult<Vec<ActiveTimer>>;
    async fn set_active_timer(&self, timer: &ActiveTimer) -> StoreResult<()>;
    async fn remove_active_timer(&self, task_id: &str) -> StoreResult<bool>;

    async fn get_settings(&self) -> StoreResult<Settings>;
    async fn update_settings(&self, settings: &Settings) -> StoreResult<()>;
}

/// Returns `~/.config/tasktrack[-dev]/` based on TASKTRACK_ENV.
///
/// Set TASKTRACK_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("TASKTRACK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("tasktrack-dev")
    } else {
        base_dir.join("tasktrack")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
