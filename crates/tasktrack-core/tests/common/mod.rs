//! Store double shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tasktrack_core::project::{Project, ProjectPatch};
use tasktrack_core::settings::Settings;
use tasktrack_core::storage::{SqliteStore, Store, StoreResult};
use tasktrack_core::task::{Task, TaskFilter, TaskPatch};
use tasktrack_core::timer::{ActiveTimer, TimeEntry, TimeEntryFilter};
use tasktrack_core::{DatabaseError, ManualClock, ScheduledNotification};

/// Delegates to SQLite with injectable faults:
/// failing time entry writes, unreadable task rows and slow task updates.
pub struct FlakyStore {
    inner: SqliteStore,
    entry_failures: AtomicUsize,
    corrupt_tasks: Mutex<HashSet<String>>,
    update_delay_ms: AtomicU64,
}

impl FlakyStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            entry_failures: AtomicUsize::new(0),
            corrupt_tasks: Mutex::new(HashSet::new()),
            update_delay_ms: AtomicU64::new(0),
        }
    }

    pub fn in_memory(clock: &ManualClock) -> Self {
        Self::new(
            SqliteStore::open_memory()
                .unwrap()
                .with_clock(Arc::new(clock.clone())),
        )
    }

    /// Fail the next `n` time entry writes.
    pub fn fail_entries(&self, n: usize) {
        self.entry_failures.store(n, Ordering::SeqCst);
    }

    /// Make `get_task` report the row as corrupt.
    pub fn corrupt_task(&self, id: &str) {
        self.corrupt_tasks.lock().unwrap().insert(id.to_string());
    }

    pub fn repair_task(&self, id: &str) {
        self.corrupt_tasks.lock().unwrap().remove(id);
    }

    /// Sleep after each task update has been written.
    pub fn delay_updates(&self, delay: Duration) {
        self.update_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn get_task(&self, id: &str) -> StoreResult<Option<Task>> {
        if self.corrupt_tasks.lock().unwrap().contains(id) {
            return Err(DatabaseError::Corrupt {
                table: "tasks",
                id: id.to_string(),
                message: "injected corruption".into(),
            });
        }
        self.inner.get_task(id).await
    }
    async fn list_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>> {
        self.inner.list_tasks(filter).await
    }
    async fn create_task(&self, task: &Task) -> StoreResult<()> {
        self.inner.create_task(task).await
    }
    async fn update_task(&self, id: &str, patch: &TaskPatch) -> StoreResult<Option<Task>> {
        let updated = self.inner.update_task(id, patch).await;
        let delay = self.update_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        updated
    }
    async fn delete_task(&self, id: &str) -> StoreResult<bool> {
        self.inner.delete_task(id).await
    }
    async fn get_project(&self, id: &str) -> StoreResult<Option<Project>> {
        self.inner.get_project(id).await
    }
    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        self.inner.list_projects().await
    }
    async fn create_project(&self, project: &Project) -> StoreResult<()> {
        self.inner.create_project(project).await
    }
    async fn update_project(
        &self,
        id: &str,
        patch: &ProjectPatch,
    ) -> StoreResult<Option<Project>> {
        self.inner.update_project(id, patch).await
    }
    async fn delete_project(&self, id: &str) -> StoreResult<bool> {
        self.inner.delete_project(id).await
    }
    async fn create_time_entry(&self, entry: &TimeEntry) -> StoreResult<()> {
        let remaining = self.entry_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.entry_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DatabaseError::Unavailable("injected failure".into()));
        }
        self.inner.create_time_entry(entry).await
    }
    async fn list_time_entries(&self, filter: &TimeEntryFilter) -> StoreResult<Vec<TimeEntry>> {
        self.inner.list_time_entries(filter).await
    }
    async fn get_notification(&self, id: &str) -> StoreResult<Option<ScheduledNotification>> {
        self.inner.get_notification(id).await
    }
    async fn list_notifications(
        &self,
        active_only: bool,
    ) -> StoreResult<Vec<ScheduledNotification>> {
        self.inner.list_notifications(active_only).await
    }
    async fn upsert_notification(&self, notification: &ScheduledNotification) -> StoreResult<()> {
        self.inner.upsert_notification(notification).await
    }
    async fn deactivate_notification(&self, id: &str) -> StoreResult<bool> {
        self.inner.deactivate_notification(id).await
    }
    async fn get_active_timer(&self, task_id: &str) -> StoreResult<Option<ActiveTimer>> {
        self.inner.get_active_timer(task_id).await
    }
    async fn list_active_timers(&self) -> StoreResult<Vec<ActiveTimer>> {
        self.inner.list_active_timers().await
    }
    async fn set_active_timer(&self, timer: &ActiveTimer) -> StoreResult<()> {
        self.inner.set_active_timer(timer).await
    }
    async fn remove_active_timer(&self, task_id: &str) -> StoreResult<bool> {
        self.inner.remove_active_timer(task_id).await
    }
    async fn get_settings(&self) -> StoreResult<Settings> {
        self.inner.get_settings().await
    }
    async fn update_settings(&self, settings: &Settings) -> StoreResult<()> {
        self.inner.update_settings(settings).await
    }
}
