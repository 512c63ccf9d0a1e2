//! Task manager: the context object hosts talk to.
//!
//! Owns the store, notification scheduler, timer engine and event bus, and
//! keeps them consistent: task and project mutations reschedule their
//! notifications and refresh the owning project's derived fields.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result, ValidationError};
use crate::events::EventBus;
use crate::notification::{
    LogNotifier, NotificationKind, NotificationScheduler, PlatformNotifier, ScheduledNotification,
};
use crate::project::{
    templates, DerivedTotals, NewProject, Project, ProjectPatch, ProjectStatus,
};
use crate::settings::Settings;
use crate::stats::{self, ProjectAnalytics, ProjectTimeStatistics, TaskTimeStatistics};
use crate::storage::{Config, SqliteStore, Store};
use crate::task::{NewTask, Task, TaskFilter, TaskPatch, TaskStatus, MAX_ESTIMATED_DURATION};
use crate::timer::{ActiveTimer, StopOutcome, TickReport, TimeEntry, TimeEntryFilter, TimerEngine};

const EXPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }
}

/// Full dump of one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectExport {
    pub project: Project,
    pub tasks: Vec<Task>,
    pub time_entries: Vec<TimeEntry>,
    pub analytics: Option<ProjectAnalytics>,
    pub exported_at: DateTime<Utc>,
    pub version: String,
}

/// A project together with the tasks created for it.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectBundle {
    pub project: Project,
    pub tasks: Vec<Task>,
}

pub struct TaskManager {
    store: Arc<dyn Store>,
    scheduler: Arc<NotificationScheduler>,
    engine: Arc<TimerEngine>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    config: Config,
    ticker: Mutex<Option<Ticker>>,
}

/// Background tick loop and its stop signal.
struct Ticker {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

impl TaskManager {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn PlatformNotifier>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let scheduler = Arc::new(NotificationScheduler::new(
            store.clone(),
            notifier,
            bus.clone(),
            clock.clone(),
            config.notifications.clone(),
        ));
        let engine = Arc::new(TimerEngine::new(
            store.clone(),
            scheduler.clone(),
            bus.clone(),
            clock.clone(),
        ));
        Self {
            store,
            scheduler,
            engine,
            bus,
            clock,
            config,
            ticker: Mutex::new(None),
        }
    }

    /// Manager over the configured SQLite database, logging notifications.
    pub fn open(config: Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = SqliteStore::open_default(&config)?.with_clock(clock.clone());
        Ok(Self::new(
            Arc::new(store),
            Arc::new(LogNotifier),
            clock,
            config,
        ))
    }

    pub fn engine(&self) -> &TimerEngine {
        &self.engine
    }

    pub fn scheduler(&self) -> &NotificationScheduler {
        &self.scheduler
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ── Tasks ────────────────────────────────────────────────────────

    pub async fn get_task(&self, id: &str) -> Result<Task> {
        self.store
            .get_task(id)
            .await?
            .ok_or_else(|| CoreError::task_not_found(id))
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        Ok(self.store.list_tasks(filter).await?)
    }

    /// Create a task and schedule its start and due reminders.
    pub async fn create_task(&self, new: NewTask) -> Result<Task> {
        validate_title(&new.title)?;
        validate_estimate(new.estimated_duration)?;
        if let Some(project_id) = &new.project_id {
            self.get_project(project_id).await?;
        }

        let task = new.into_task(self.clock.now());
        self.store.create_task(&task).await?;
        tracing::info!(task_id = %task.id, title = %task.title, "task created");

        self.reschedule_task(&task).await;
        self.refresh_owner(task.project_id.as_deref()).await;

        if self.store.get_settings().await?.auto_start_timer {
            self.engine.start(&task.id).await?;
            return self.get_task(&task.id).await;
        }
        Ok(task)
    }

    /// Apply a patch. Timer-owned fields are rejected, and a closing status
    /// stops the task's timer first.
    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        if patch.time_spent.is_some()
            || patch.is_timer_running.is_some()
            || patch.timer_start_time.is_some()
        {
            return Err(ValidationError::invalid(
                "time_spent",
                "timer fields are managed by the timer engine",
            )
            .into());
        }
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }
        if let Some(estimate) = patch.estimated_duration {
            validate_estimate(estimate)?;
        }
        if let Some(Some(project_id)) = &patch.project_id {
            self.get_project(project_id).await?;
        }

        let before = self.get_task(id).await?;
        // Closing a task ends its session, as `complete_task` does.
        let closing = patch.status.is_some_and(|s| s.is_closed());
        if closing && self.engine.active_timer(id).is_some() {
            self.engine.stop(id).await?;
        }
        let updated = self
            .store
            .update_task(id, &patch)
            .await?
            .ok_or_else(|| CoreError::task_not_found(id))?;
        tracing::info!(task_id = id, "task updated");

        if patch.start_time.is_some() || patch.due_date.is_some() || patch.status.is_some() {
            self.reschedule_task(&updated).await;
        }
        if before.project_id != updated.project_id {
            self.refresh_owner(before.project_id.as_deref()).await;
        }
        self.refresh_owner(updated.project_id.as_deref()).await;
        Ok(updated)
    }

    /// Stop a running timer, mark the task completed and drop its reminders.
    pub async fn complete_task(&self, id: &str) -> Result<Task> {
        self.get_task(id).await?;
        if self.engine.active_timer(id).is_some() {
            self.engine.stop(id).await?;
        }
        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            ..TaskPatch::default()
        };
        let task = self
            .store
            .update_task(id, &patch)
            .await?
            .ok_or_else(|| CoreError::task_not_found(id))?;
        if let Err(e) = self.scheduler.cancel_for_task(id).await {
            tracing::warn!(task_id = id, error = %e, "failed to cancel task notifications");
        }
        tracing::info!(task_id = id, "task completed");
        self.refresh_owner(task.project_id.as_deref()).await;
        Ok(task)
    }

    /// Delete a task with its time entries, timer and notifications.
    pub async fn delete_task(&self, id: &str) -> Result<bool> {
        let task = self.get_task(id).await?;
        self.discard_task(&task).await?;
        self.refresh_owner(task.project_id.as_deref()).await;
        Ok(true)
    }

    async fn discard_task(&self, task: &Task) -> Result<()> {
        if self.engine.active_timer(&task.id).is_some() {
            self.engine.stop(&task.id).await?;
        }
        if let Err(e) = self.scheduler.cancel_for_task(&task.id).await {
            tracing::warn!(task_id = %task.id, error = %e, "failed to cancel task notifications");
        }
        self.store.delete_task(&task.id).await?;
        tracing::info!(task_id = %task.id, "task deleted");
        Ok(())
    }

    async fn reschedule_task(&self, task: &Task) {
        if task.status.is_closed() {
            if let Err(e) = self.scheduler.cancel_for_task(&task.id).await {
                tracing::warn!(task_id = %task.id, error = %e, "failed to cancel task notifications");
            }
            return;
        }
        if let Err(e) = self.scheduler.on_task_start(task).await {
            tracing::warn!(task_id = %task.id, error = %e, "failed to schedule start reminder");
        }
        if let Err(e) = self.scheduler.on_task_due(task).await {
            tracing::warn!(task_id = %task.id, error = %e, "failed to schedule due reminder");
        }
    }

    // ── Timers ───────────────────────────────────────────────────────

    pub async fn start_timer(&self, task_id: &str) -> Result<ActiveTimer> {
        let timer = self.engine.start(task_id).await?;
        self.refresh_owner(timer.project_id.as_deref()).await;
        Ok(timer)
    }

    pub async fn stop_timer(&self, task_id: &str) -> Result<StopOutcome> {
        let outcome = self.engine.stop(task_id).await?;
        self.refresh_owner(outcome.task.project_id.as_deref()).await;
        Ok(outcome)
    }

    pub async fn pause_timer(&self, task_id: &str) -> Result<ActiveTimer> {
        let timer = self.engine.pause(task_id).await?;
        self.refresh_owner(timer.project_id.as_deref()).await;
        Ok(timer)
    }

    pub async fn resume_timer(&self, task_id: &str) -> Result<ActiveTimer> {
        self.engine.resume(task_id).await
    }

    pub async fn task_time_statistics(&self, task_id: &str) -> Result<TaskTimeStatistics> {
        self.engine.task_time_statistics(task_id).await
    }

    pub async fn project_time_statistics(&self, project_id: &str) -> Result<ProjectTimeStatistics> {
        self.engine.project_time_statistics(project_id).await
    }

    // ── Projects ─────────────────────────────────────────────────────

    pub async fn get_project(&self, id: &str) -> Result<Project> {
        self.store
            .get_project(id)
            .await?
            .ok_or_else(|| CoreError::project_not_found(id))
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.store.list_projects().await?)
    }

    pub async fn create_project(&self, new: NewProject) -> Result<Project> {
        validate_name(&new.name)?;
        validate_range(new.start_date, new.end_date)?;
        let project = new.into_project(self.clock.now());
        self.store.create_project(&project).await?;
        tracing::info!(project_id = %project.id, name = %project.name, "project created");

        if let Err(e) = self.scheduler.on_project_end_date(&project).await {
            tracing::warn!(project_id = %project.id, error = %e, "failed to schedule deadline reminder");
        }
        Ok(project)
    }

    /// Apply a patch. Derived totals are rejected.
    pub async fn update_project(&self, id: &str, patch: ProjectPatch) -> Result<Project> {
        if patch.derived.is_some() {
            return Err(ValidationError::invalid(
                "derived",
                "progress and totals are computed from tasks",
            )
            .into());
        }
        if let Some(name) = &patch.name {
            validate_name(name)?;
        }
        let before = self.get_project(id).await?;
        validate_range(
            patch.start_date.unwrap_or(before.start_date),
            patch.end_date.unwrap_or(before.end_date),
        )?;

        let updated = self
            .store
            .update_project(id, &patch)
            .await?
            .ok_or_else(|| CoreError::project_not_found(id))?;
        tracing::info!(project_id = id, "project updated");

        let closed = matches!(
            updated.status,
            ProjectStatus::Completed | ProjectStatus::Cancelled
        );
        let deadline = if closed {
            self.scheduler
                .cancel_kind(NotificationKind::ProjectDeadline, id)
                .await
                .map(|_| None)
        } else if patch.end_date.is_some() || patch.status.is_some() {
            self.scheduler.on_project_end_date(&updated).await
        } else {
            Ok(None)
        };
        if let Err(e) = deadline {
            tracing::warn!(project_id = id, error = %e, "failed to reschedule deadline reminder");
        }
        Ok(updated)
    }

    /// Delete a project and everything in it.
    pub async fn delete_project(&self, id: &str) -> Result<bool> {
        self.get_project(id).await?;
        let tasks = self.store.list_tasks(&TaskFilter::by_project(id)).await?;
        for task in &tasks {
            self.discard_task(task).await?;
        }
        if let Err(e) = self.scheduler.cancel_for_project(id).await {
            tracing::warn!(project_id = id, error = %e, "failed to cancel project notifications");
        }
        let deleted = self.store.delete_project(id).await?;
        tracing::info!(project_id = id, tasks = tasks.len(), "project deleted");
        Ok(deleted)
    }

    /// Recompute derived fields; auto-complete when every task is completed.
    pub async fn refresh_project(&self, id: &str) -> Result<Project> {
        let project = self.get_project(id).await?;
        let tasks = self.store.list_tasks(&TaskFilter::by_project(id)).await?;
        let totals = DerivedTotals::from_tasks(&tasks, |t| self.engine.live_time_spent(t));

        let all_completed =
            !tasks.is_empty() && tasks.iter().all(|t| t.status == TaskStatus::Completed);
        let auto_complete = all_completed && project.status != ProjectStatus::Completed;
        let mut patch = ProjectPatch::derived(totals);
        if auto_complete {
            patch.status = Some(ProjectStatus::Completed);
        }

        let updated = self
            .store
            .update_project(id, &patch)
            .await?
            .ok_or_else(|| CoreError::project_not_found(id))?;

        if auto_complete {
            tracing::info!(project_id = id, "project auto-completed");
            if let Err(e) = self
                .scheduler
                .notify_now(
                    NotificationKind::ProjectCompleted,
                    id,
                    "Project Completed!",
                    &format!("Congratulations! \"{}\" has been completed.", updated.name),
                )
                .await
            {
                tracing::warn!(project_id = id, error = %e, "failed to send completion notification");
            }
            if let Err(e) = self
                .scheduler
                .cancel_kind(NotificationKind::ProjectDeadline, id)
                .await
            {
                tracing::warn!(project_id = id, error = %e, "failed to cancel deadline reminder");
            }
        }
        Ok(updated)
    }

    async fn refresh_owner(&self, project_id: Option<&str>) {
        let Some(project_id) = project_id else {
            return;
        };
        if let Err(e) = self.refresh_project(project_id).await {
            tracing::warn!(project_id, error = %e, "failed to refresh project");
        }
    }

    pub async fn project_analytics(&self, id: &str) -> Result<ProjectAnalytics> {
        let project = self.get_project(id).await?;
        let tasks = self.store.list_tasks(&TaskFilter::by_project(id)).await?;
        let entries = self
            .store
            .list_time_entries(&TimeEntryFilter::by_project(id))
            .await?;
        Ok(stats::project_analytics(
            &project,
            &tasks,
            &entries,
            &self.engine.active_timers(),
            self.clock.now(),
        ))
    }

    // ── Templates and export ─────────────────────────────────────────

    pub async fn create_project_from_template(
        &self,
        key: &str,
        name: Option<String>,
    ) -> Result<ProjectBundle> {
        let template = templates::find(key)
            .ok_or_else(|| ValidationError::invalid("template", format!("unknown template '{key}'")))?;
        let project = self
            .create_project(NewProject::named(
                name.unwrap_or_else(|| template.name.to_string()),
            ))
            .await?;

        let mut tasks = Vec::with_capacity(template.tasks.len());
        for new in template.new_tasks(&project.id) {
            let task = new.into_task(self.clock.now());
            self.store.create_task(&task).await?;
            tasks.push(task);
        }
        tracing::info!(project_id = %project.id, template = key, tasks = tasks.len(), "project created from template");
        let project = self.refresh_project(&project.id).await?;
        Ok(ProjectBundle { project, tasks })
    }

    pub async fn export_project(&self, id: &str, format: ExportFormat) -> Result<String> {
        let project = self.get_project(id).await?;
        let tasks = self.store.list_tasks(&TaskFilter::by_project(id)).await?;
        match format {
            ExportFormat::Csv => Ok(tasks_csv(&tasks)),
            ExportFormat::Json => {
                let time_entries = self
                    .store
                    .list_time_entries(&TimeEntryFilter::by_project(id))
                    .await?;
                let analytics = self.project_analytics(id).await?;
                let export = ProjectExport {
                    project,
                    tasks,
                    time_entries,
                    analytics: Some(analytics),
                    exported_at: self.clock.now(),
                    version: EXPORT_VERSION.to_string(),
                };
                Ok(serde_json::to_string_pretty(&export)?)
            }
        }
    }

    /// Recreate an exported project under fresh ids.
    ///
    /// Tracked time and time entries are not imported.
    pub async fn import_project(&self, json: &str) -> Result<ProjectBundle> {
        let export: ProjectExport = serde_json::from_str(json)?;
        let source = export.project;
        let project = self
            .create_project(NewProject {
                name: source.name,
                description: source.description,
                color: Some(source.color),
                start_date: source.start_date,
                end_date: source.end_date,
            })
            .await?;

        let mut tasks = Vec::with_capacity(export.tasks.len());
        for task in export.tasks {
            let status = match task.status {
                TaskStatus::InProgress => TaskStatus::Pending,
                other => other,
            };
            let created = self
                .create_task(NewTask {
                    title: task.title,
                    description: task.description,
                    status,
                    priority: task.priority,
                    project_id: Some(project.id.clone()),
                    start_time: task.start_time,
                    due_date: task.due_date,
                    estimated_duration: task.estimated_duration,
                    tags: task.tags,
                })
                .await?;
            tasks.push(created);
        }
        let project = self.refresh_project(&project.id).await?;
        Ok(ProjectBundle { project, tasks })
    }

    // ── Notifications and settings ───────────────────────────────────

    pub async fn pending_notifications(&self) -> Result<Vec<ScheduledNotification>> {
        Ok(self.store.list_notifications(true).await?)
    }

    /// Immediate alerts for overdue and soon-starting tasks.
    pub async fn check_due_tasks(&self) -> Result<usize> {
        let tasks = self.store.list_tasks(&TaskFilter::default()).await?;
        self.scheduler.check_due_tasks(&tasks).await
    }

    pub async fn schedule_daily_reminder(&self) -> Result<Option<ScheduledNotification>> {
        let pending = self
            .store
            .list_tasks(&TaskFilter::by_status(TaskStatus::Pending))
            .await?
            .len();
        self.scheduler.schedule_daily_reminder(pending).await
    }

    pub async fn settings(&self) -> Result<Settings> {
        Ok(self.store.get_settings().await?)
    }

    pub async fn update_settings(&self, settings: Settings) -> Result<Settings> {
        if settings.default_task_duration <= 0 {
            return Err(
                ValidationError::invalid("default_task_duration", "must be positive").into(),
            );
        }
        self.store.update_settings(&settings).await?;
        tracing::info!("settings updated");
        Ok(settings)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Reload pending notifications and rebuild timers from snapshots.
    pub async fn recover(&self) -> Result<usize> {
        let notifications = self.scheduler.load().await?;
        let timers = self.engine.recover().await?;
        for project_id in self.running_projects() {
            self.refresh_owner(Some(&project_id)).await;
        }
        tracing::info!(notifications, timers, "recovered state");
        Ok(timers)
    }

    /// One reconciliation pass, then refresh projects with running timers.
    pub async fn tick(&self) -> Result<TickReport> {
        let report = self.engine.tick().await?;
        for project_id in self.running_projects() {
            self.refresh_owner(Some(&project_id)).await;
        }
        Ok(report)
    }

    /// Start the periodic ticker. Returns false if one is already running.
    pub fn spawn_ticker(self: &Arc<Self>) -> bool {
        let mut slot = self.ticker.lock().unwrap_or_else(|p| p.into_inner());
        if slot.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }
        let period = std::time::Duration::from_secs(self.config.timer.tick_interval_secs.max(1));
        let manager = Arc::downgrade(self);
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = stopped.changed() => break,
                }
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                // A pass in progress always runs to completion.
                if let Err(e) = manager.tick().await {
                    tracing::warn!(error = %e, "tick failed");
                }
                if *stopped.borrow() {
                    break;
                }
            }
        });
        *slot = Some(Ticker { handle, stop });
        tracing::debug!(period_secs = period.as_secs(), "ticker started");
        true
    }

    /// Stop the ticker, waiting for a pass in progress, and persist timer
    /// state. Timers keep running.
    pub async fn shutdown(&self) -> Result<()> {
        let ticker = self
            .ticker
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(ticker) = ticker {
            // Err only means the loop already exited.
            let _ = ticker.stop.send(true);
            if let Err(e) = ticker.handle.await {
                tracing::warn!(error = %e, "ticker task failed");
            }
        }
        self.engine.flush().await?;
        tracing::info!("task manager shut down");
        Ok(())
    }

    fn running_projects(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .engine
            .active_timers()
            .into_iter()
            .filter(|t| t.is_running)
            .filter_map(|t| t.project_id)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("engine", &self.engine)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::invalid("title", "must not be empty"));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::invalid("name", "must not be empty"));
    }
    Ok(())
}

fn validate_estimate(estimate: Option<i64>) -> Result<(), ValidationError> {
    match estimate {
        Some(m) if m < 0 => Err(ValidationError::invalid(
            "estimated_duration",
            "must not be negative",
        )),
        Some(m) if m > MAX_ESTIMATED_DURATION => Err(ValidationError::invalid(
            "estimated_duration",
            format!("must be at most {MAX_ESTIMATED_DURATION} minutes"),
        )),
        _ => Ok(()),
    }
}

fn validate_range(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<(), ValidationError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => {
            Err(ValidationError::InvalidTimeRange { start, end })
        }
        _ => Ok(()),
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// One row per task.
fn tasks_csv(tasks: &[Task]) -> String {
    let mut out =
        String::from("Task ID,Title,Status,Priority,Estimated Duration,Actual Time,Due Date\n");
    for task in tasks {
        let row = [
            csv_field(&task.id),
            csv_field(&task.title),
            task.status.as_str().to_string(),
            task.priority.as_str().to_string(),
            task.estimated_duration.unwrap_or(0).to_string(),
            task.time_spent.to_string(),
            task.due_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}
