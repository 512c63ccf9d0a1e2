//! Timer engine implementation.
//!
//! Tracks zero or more per-task timers. Each task's timer is an independent
//! state machine; commands for the same task are serialized through
//! [`KeyedLocks`], commands for different tasks never wait on each other.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> Paused -> Running -> (stop) -> Idle
//! ```
//!
//! ## Accounting
//!
//! `Task::time_spent` is always `base_time_spent + elapsed of the current
//! segment`. The base is captured at start, advanced at pause, and never
//! re-added by later ticks, so reconciling twice cannot double count.
//!
//! The engine has no internal thread: callers (the task manager's ticker)
//! invoke [`TimerEngine::tick`] periodically.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, RwLock};

use serde::Serialize;

use super::{ActiveTimer, KeyedLocks, TimeEntry, TimeEntryFilter};
use crate::clock::{minutes_between, Clock};
use crate::error::{CoreError, Result};
use crate::events::{Event, EventBus};
use crate::notification::{NotificationKind, NotificationScheduler};
use crate::stats::{ProjectTimeStatistics, TaskTimeStatistics};
use crate::storage::{Store, StoreResult};
use crate::task::{Task, TaskFilter, TaskPatch, TaskStatus};

/// Result of an explicit stop.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StopOutcome {
    pub task: Task,
    pub entry: TimeEntry,
    pub elapsed_minutes: i64,
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TickReport {
    pub updated: usize,
    pub timed_up: usize,
    pub notifications_swept: usize,
}

/// A finished segment. `entry` is `None` only for instantaneous implicit stops.
struct Settled {
    task: Task,
    entry: Option<TimeEntry>,
    elapsed: i64,
}

/// Run a persistence step, retrying it once on failure.
async fn retry_once<T, F, Fut>(step: &'static str, task_id: &str, mut op: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(first) => {
            tracing::warn!(step, task_id, error = %first, "persistence step failed, retrying once");
            op().await.inspect_err(|e| {
                tracing::error!(step, task_id, error = %e, "persistence step failed twice");
            })
        }
    }
}

pub struct TimerEngine {
    store: Arc<dyn Store>,
    scheduler: Arc<NotificationScheduler>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    timers: RwLock<HashMap<String, ActiveTimer>>,
    locks: KeyedLocks,
}

impl TimerEngine {
    pub fn new(
        store: Arc<dyn Store>,
        scheduler: Arc<NotificationScheduler>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            scheduler,
            bus,
            clock,
            timers: RwLock::new(HashMap::new()),
            locks: KeyedLocks::new(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn active_timer(&self, task_id: &str) -> Option<ActiveTimer> {
        self.timers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(task_id)
            .cloned()
    }

    /// All running and paused timers, oldest segment first.
    pub fn active_timers(&self) -> Vec<ActiveTimer> {
        let mut all: Vec<ActiveTimer> = self
            .timers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        all
    }

    pub fn is_timer_running(&self, task_id: &str) -> bool {
        self.active_timer(task_id).is_some_and(|t| t.is_running)
    }

    /// Live minutes while running, frozen minutes while paused, 0 when idle.
    pub fn current_elapsed_minutes(&self, task_id: &str) -> i64 {
        self.active_timer(task_id)
            .map_or(0, |t| t.live_elapsed(self.clock.now()))
    }

    /// Up-to-date minutes worked on `task`, including a running segment.
    pub fn live_time_spent(&self, task: &Task) -> i64 {
        self.active_timer(&task.id)
            .map_or(task.time_spent, |t| t.live_time_spent(self.clock.now()))
    }

    pub async fn task_time_statistics(&self, task_id: &str) -> Result<TaskTimeStatistics> {
        let task = self.load_task(task_id).await?;
        let entries = self
            .store
            .list_time_entries(&TimeEntryFilter::by_task(task_id))
            .await?;
        Ok(TaskTimeStatistics::compute(
            &task,
            entries,
            self.current_elapsed_minutes(task_id),
        ))
    }

    pub async fn project_time_statistics(&self, project_id: &str) -> Result<ProjectTimeStatistics> {
        self.store
            .get_project(project_id)
            .await?
            .ok_or_else(|| CoreError::project_not_found(project_id))?;
        let tasks = self
            .store
            .list_tasks(&TaskFilter::by_project(project_id))
            .await?;
        let entries = self
            .store
            .list_time_entries(&TimeEntryFilter::by_project(project_id))
            .await?;
        Ok(ProjectTimeStatistics::compute(
            project_id,
            &tasks,
            &entries,
            |id| self.current_elapsed_minutes(id),
            |id| self.is_timer_running(id),
        ))
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start (or restart) the timer for a task.
    ///
    /// An active timer for the same task is stopped first; its segment is
    /// recorded as a time entry unless it lasted less than a minute.
    pub async fn start(&self, task_id: &str) -> Result<ActiveTimer> {
        let _guard = self.locks.lock(task_id).await;
        let mut task = self.load_task(task_id).await?;

        if let Some(existing) = self.active_timer(task_id) {
            tracing::debug!(task_id, "restarting active timer");
            task = self.settle(&task, &existing, true).await?.task;
        }

        let now = self.clock.now();
        let timer = ActiveTimer::started(&task, now);
        let patch = TaskPatch {
            status: Some(TaskStatus::InProgress),
            is_timer_running: Some(true),
            timer_start_time: Some(Some(now)),
            ..TaskPatch::default()
        };
        let started = retry_once("start: update task", task_id, || {
            self.store.update_task(task_id, &patch)
        })
        .await?
        .ok_or_else(|| CoreError::task_not_found(task_id))?;

        if let Err(e) = retry_once("start: persist snapshot", task_id, || {
            self.store.set_active_timer(&timer)
        })
        .await
        {
            self.restore_task(&task).await;
            return Err(e.into());
        }
        self.insert_timer(timer.clone());

        if let Err(e) = self.scheduler.on_timer_started(&started, now).await {
            tracing::warn!(task_id, error = %e, "failed to schedule time-up notification");
        }

        tracing::info!(task_id, "timer started");
        self.bus.publish(&Event::TimerStarted {
            task_id: task_id.to_string(),
            project_id: started.project_id.clone(),
            at: now,
        });
        Ok(timer)
    }

    /// Stop the task's timer and record the segment.
    ///
    /// Fails with `InvalidState` when the task has no active timer.
    pub async fn stop(&self, task_id: &str) -> Result<StopOutcome> {
        let _guard = self.locks.lock(task_id).await;
        let timer = self
            .active_timer(task_id)
            .ok_or_else(|| CoreError::InvalidState(format!("no active timer for task {task_id}")))?;
        let task = self.load_task(task_id).await?;

        let settled = self.settle(&task, &timer, false).await?;
        let entry = settled
            .entry
            .ok_or_else(|| CoreError::InvalidState(format!("stop of {task_id} recorded no entry")))?;
        Ok(StopOutcome {
            task: settled.task,
            entry,
            elapsed_minutes: settled.elapsed,
        })
    }

    /// Fold the running segment into `time_spent` and freeze the timer.
    pub async fn pause(&self, task_id: &str) -> Result<ActiveTimer> {
        let _guard = self.locks.lock(task_id).await;
        let timer = self
            .active_timer(task_id)
            .filter(|t| t.is_running)
            .ok_or_else(|| CoreError::InvalidState(format!("no running timer for task {task_id}")))?;
        let task = self.load_task(task_id).await?;

        let now = self.clock.now();
        let elapsed = minutes_between(timer.start_time, now);
        let time_spent = timer.base_time_spent + elapsed;
        let patch = TaskPatch {
            time_spent: Some(time_spent),
            is_timer_running: Some(false),
            timer_start_time: Some(None),
            ..TaskPatch::default()
        };
        retry_once("pause: update task", task_id, || {
            self.store.update_task(task_id, &patch)
        })
        .await?
        .ok_or_else(|| CoreError::task_not_found(task_id))?;

        let paused = ActiveTimer {
            elapsed_time: elapsed,
            is_running: false,
            paused_at: Some(now),
            base_time_spent: time_spent,
            ..timer
        };
        if let Err(e) = retry_once("pause: persist snapshot", task_id, || {
            self.store.set_active_timer(&paused)
        })
        .await
        {
            self.restore_task(&task).await;
            return Err(e.into());
        }
        self.insert_timer(paused.clone());

        tracing::info!(task_id, elapsed, "timer paused");
        self.bus.publish(&Event::TimerPaused {
            task_id: task_id.to_string(),
            elapsed_minutes: elapsed,
            at: now,
        });
        Ok(paused)
    }

    /// Begin a new segment for a paused timer.
    pub async fn resume(&self, task_id: &str) -> Result<ActiveTimer> {
        let _guard = self.locks.lock(task_id).await;
        let timer = self
            .active_timer(task_id)
            .filter(|t| !t.is_running)
            .ok_or_else(|| CoreError::InvalidState(format!("no paused timer for task {task_id}")))?;
        let task = self.load_task(task_id).await?;

        let now = self.clock.now();
        let patch = TaskPatch {
            is_timer_running: Some(true),
            timer_start_time: Some(Some(now)),
            ..TaskPatch::default()
        };
        retry_once("resume: update task", task_id, || {
            self.store.update_task(task_id, &patch)
        })
        .await?
        .ok_or_else(|| CoreError::task_not_found(task_id))?;

        let resumed = ActiveTimer {
            start_time: now,
            elapsed_time: 0,
            is_running: true,
            paused_at: None,
            ..timer
        };
        if let Err(e) = retry_once("resume: persist snapshot", task_id, || {
            self.store.set_active_timer(&resumed)
        })
        .await
        {
            self.restore_task(&task).await;
            return Err(e.into());
        }
        self.insert_timer(resumed.clone());

        tracing::info!(task_id, "timer resumed");
        self.bus.publish(&Event::TimerResumed {
            task_id: task_id.to_string(),
            at: now,
        });
        Ok(resumed)
    }

    // ── Reconciliation ───────────────────────────────────────────────

    /// One reconciliation pass over running timers.
    ///
    /// Per-timer failures are logged and skipped; the pass always finishes
    /// with a `TimersUpdated` event.
    pub async fn tick(&self) -> Result<TickReport> {
        let running: Vec<String> = self
            .active_timers()
            .into_iter()
            .filter(|t| t.is_running)
            .map(|t| t.task_id)
            .collect();

        let mut report = TickReport::default();
        for task_id in running {
            let _guard = self.locks.lock(&task_id).await;
            // A stop or pause may have won the race for the lock.
            let Some(mut timer) = self.active_timer(&task_id).filter(|t| t.is_running) else {
                continue;
            };
            match self.reconcile(&mut timer).await {
                Ok(timed_up) => {
                    report.updated += 1;
                    if timed_up {
                        report.timed_up += 1;
                    }
                }
                Err(e) => tracing::warn!(task_id, error = %e, "failed to reconcile timer"),
            }
        }

        let now = self.clock.now();
        match self.scheduler.sweep_fired(now).await {
            Ok(swept) => report.notifications_swept = swept,
            Err(e) => tracing::warn!(error = %e, "failed to sweep fired notifications"),
        }

        tracing::debug!(
            updated = report.updated,
            timed_up = report.timed_up,
            swept = report.notifications_swept,
            "tick"
        );
        self.bus.publish(&Event::TimersUpdated {
            timers: self.active_timers(),
            at: now,
        });
        Ok(report)
    }

    /// Reconcile once without stopping anything, so recovery can continue
    /// the timers after a restart.
    pub async fn flush(&self) -> Result<TickReport> {
        self.tick().await
    }

    /// Rebuild the in-memory table from persisted snapshots.
    ///
    /// Snapshots of deleted tasks and of timers whose task no longer claims
    /// to be running are discarded. Running timers have the time since their
    /// persisted start folded into the task before ticking resumes.
    ///
    /// Only a failure to list the snapshots is an error. A snapshot that
    /// cannot be restored is logged and skipped, so the remaining timers
    /// still come back.
    pub async fn recover(&self) -> Result<usize> {
        let snapshots = self.store.list_active_timers().await?;
        let mut restored = 0;
        let mut failed = HashSet::new();

        for timer in snapshots {
            let task_id = timer.task_id.clone();
            let _guard = self.locks.lock(&task_id).await;
            match self.recover_snapshot(timer).await {
                Ok(true) => restored += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(task_id, error = %e, "failed to recover timer");
                    failed.insert(task_id);
                }
            }
        }

        // Tasks flagged as running without a running timer lost their
        // snapshot mid-transition.
        let filter = TaskFilter {
            timer_running: Some(true),
            ..TaskFilter::default()
        };
        match self.store.list_tasks(&filter).await {
            Ok(flagged) => {
                for task in flagged {
                    // Unrecovered snapshots keep their flag for the next attempt.
                    if self.is_timer_running(&task.id) || failed.contains(&task.id) {
                        continue;
                    }
                    tracing::warn!(task_id = %task.id, "clearing running flag without a timer");
                    let patch = TaskPatch {
                        is_timer_running: Some(false),
                        timer_start_time: Some(None),
                        ..TaskPatch::default()
                    };
                    if let Err(e) = self.store.update_task(&task.id, &patch).await {
                        tracing::warn!(task_id = %task.id, error = %e, "failed to clear running flag");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to list tasks flagged as running"),
        }

        tracing::info!(restored, "recovered active timers");
        Ok(restored)
    }

    /// Restore one snapshot. Returns false when it was discarded.
    async fn recover_snapshot(&self, mut timer: ActiveTimer) -> Result<bool> {
        let task_id = timer.task_id.clone();
        let Some(task) = self.store.get_task(&task_id).await? else {
            tracing::warn!(task_id, "discarding timer snapshot for missing task");
            self.store.remove_active_timer(&task_id).await?;
            return Ok(false);
        };
        if timer.is_running && !task.is_timer_running {
            tracing::warn!(task_id, "discarding stale running snapshot");
            self.store.remove_active_timer(&task_id).await?;
            return Ok(false);
        }

        if timer.is_running {
            let now = self.clock.now();
            timer.elapsed_time = minutes_between(timer.start_time, now);
            let patch = TaskPatch {
                time_spent: Some(timer.live_time_spent(now)),
                is_timer_running: Some(true),
                timer_start_time: Some(Some(timer.start_time)),
                ..TaskPatch::default()
            };
            retry_once("recover: update task", &task_id, || {
                self.store.update_task(&task_id, &patch)
            })
            .await?;
            retry_once("recover: persist snapshot", &task_id, || {
                self.store.set_active_timer(&timer)
            })
            .await?;
        }
        self.insert_timer(timer);
        Ok(true)
    }

    /// Stop every active timer. Returns the first error after trying all.
    pub async fn stop_all(&self) -> Result<Vec<StopOutcome>> {
        let ids: Vec<String> = self
            .active_timers()
            .into_iter()
            .map(|t| t.task_id)
            .collect();
        let mut outcomes = Vec::with_capacity(ids.len());
        let mut first_error = None;
        for task_id in ids {
            match self.stop(&task_id).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::warn!(task_id, error = %e, "failed to stop timer");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn load_task(&self, task_id: &str) -> Result<Task> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::task_not_found(task_id))
    }

    fn insert_timer(&self, timer: ActiveTimer) {
        self.timers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(timer.task_id.clone(), timer);
    }

    fn remove_timer(&self, task_id: &str) {
        self.timers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(task_id);
    }

    /// Best-effort rollback of the timer fields after a failed transition.
    async fn restore_task(&self, before: &Task) {
        let patch = TaskPatch {
            status: Some(before.status),
            time_spent: Some(before.time_spent),
            is_timer_running: Some(before.is_timer_running),
            timer_start_time: Some(before.timer_start_time),
            ..TaskPatch::default()
        };
        if let Err(e) = self.store.update_task(&before.id, &patch).await {
            tracing::error!(task_id = %before.id, error = %e, "failed to restore task after error");
        }
    }

    /// Close the current segment: task first, then the time entry, then the
    /// snapshot. Caller holds the task's lock.
    async fn settle(&self, task: &Task, timer: &ActiveTimer, implicit: bool) -> Result<Settled> {
        let task_id = task.id.as_str();
        let now = self.clock.now();
        let (segment_end, elapsed) = if timer.is_running {
            (now, minutes_between(timer.start_time, now))
        } else {
            // Already folded into time_spent at pause.
            (timer.paused_at.unwrap_or(now), timer.elapsed_time)
        };

        let patch = TaskPatch {
            time_spent: Some(timer.live_time_spent(now)),
            is_timer_running: Some(false),
            timer_start_time: Some(None),
            ..TaskPatch::default()
        };
        let updated = retry_once("stop: update task", task_id, || {
            self.store.update_task(task_id, &patch)
        })
        .await?
        .ok_or_else(|| CoreError::task_not_found(task_id))?;

        let entry = (!implicit || elapsed >= 1).then(|| {
            TimeEntry::for_segment(task_id, timer.project_id.clone(), timer.start_time, segment_end)
        });
        if let Some(entry) = &entry {
            if let Err(e) = retry_once("stop: create time entry", task_id, || {
                self.store.create_time_entry(entry)
            })
            .await
            {
                self.restore_task(task).await;
                return Err(e.into());
            }
        }

        self.remove_timer(task_id);
        if let Err(e) = retry_once("stop: remove snapshot", task_id, || {
            self.store.remove_active_timer(task_id)
        })
        .await
        {
            // Recovery discards running snapshots of tasks that are not running.
            tracing::error!(task_id, error = %e, "stale timer snapshot left behind");
        }
        if let Err(e) = self
            .scheduler
            .cancel_kind(NotificationKind::TimeUp, task_id)
            .await
        {
            tracing::warn!(task_id, error = %e, "failed to cancel time-up notification");
        }

        tracing::info!(task_id, elapsed, implicit, "timer stopped");
        self.bus.publish(&Event::TimerStopped {
            task_id: task_id.to_string(),
            entry: entry.clone(),
            elapsed_minutes: elapsed,
            at: now,
        });
        Ok(Settled {
            task: updated,
            entry,
            elapsed,
        })
    }

    /// Bring one running timer and its task up to date. Returns whether the
    /// estimate was crossed on this pass.
    async fn reconcile(&self, timer: &mut ActiveTimer) -> Result<bool> {
        let task_id = timer.task_id.clone();
        let task = self.load_task(&task_id).await?;
        let now = self.clock.now();

        timer.elapsed_time = minutes_between(timer.start_time, now);
        let estimate = task.estimated_duration.filter(|m| *m > 0);
        let crossed = !timer.time_up_notified && estimate.is_some_and(|est| timer.elapsed_time >= est);

        let mut patch = TaskPatch {
            time_spent: Some(timer.live_time_spent(now)),
            ..TaskPatch::default()
        };
        if crossed {
            patch.status = Some(TaskStatus::Overdue);
        }
        retry_once("tick: update task", &task_id, || {
            self.store.update_task(&task_id, &patch)
        })
        .await?
        .ok_or_else(|| CoreError::task_not_found(&task_id))?;

        timer.time_up_notified |= crossed;
        self.insert_timer(timer.clone());
        let snapshot = timer.clone();
        if let Err(e) = retry_once("tick: persist snapshot", &task_id, || {
            self.store.set_active_timer(&snapshot)
        })
        .await
        {
            tracing::warn!(task_id, error = %e, "snapshot not persisted this tick");
        }

        if let (true, Some(estimated)) = (crossed, estimate) {
            tracing::info!(task_id, elapsed = timer.elapsed_time, estimated, "time up");
            if let Err(e) = self
                .scheduler
                .notify_now(
                    NotificationKind::TimeUp,
                    &task_id,
                    "Time Up!",
                    &format!("Estimated time for \"{}\" has elapsed", task.title),
                )
                .await
            {
                tracing::warn!(task_id, error = %e, "failed to send time-up notification");
            }
            self.bus.publish(&Event::TimerUp {
                task_id: task_id.clone(),
                elapsed_minutes: timer.elapsed_time,
                estimated_minutes: estimated,
                at: now,
            });
        }
        Ok(crossed)
    }
}

impl std::fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEngine")
            .field("active_timers", &self.active_timers().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::ListenerError;
    use crate::notification::RecordingNotifier;
    use crate::storage::{NotificationsConfig, SqliteStore};
    use crate::task::NewTask;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;

    struct Fixture {
        clock: ManualClock,
        store: Arc<SqliteStore>,
        engine: TimerEngine,
        events: Arc<Mutex<Vec<Event>>>,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(t0());
        let store = Arc::new(
            SqliteStore::open_memory()
                .unwrap()
                .with_clock(Arc::new(clock.clone())),
        );
        let bus = Arc::new(EventBus::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        bus.subscribe(move |e: &Event| -> std::result::Result<(), ListenerError> {
            sink.lock().unwrap().push(e.clone());
            Ok(())
        });
        let scheduler = Arc::new(NotificationScheduler::new(
            store.clone(),
            Arc::new(RecordingNotifier::new()),
            bus.clone(),
            Arc::new(clock.clone()),
            NotificationsConfig::default(),
        ));
        let engine = TimerEngine::new(store.clone(), scheduler, bus, Arc::new(clock.clone()));
        Fixture {
            clock,
            store,
            engine,
            events,
        }
    }

    async fn add_task(f: &Fixture, estimate: Option<i64>) -> Task {
        let mut new = NewTask::titled("Write tests");
        new.estimated_duration = estimate;
        let task = new.into_task(t0());
        f.store.create_task(&task).await.unwrap();
        task
    }

    async fn task(f: &Fixture, id: &str) -> Task {
        f.store.get_task(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn start_then_stop_records_one_entry() {
        let f = fixture();
        let t = add_task(&f, None).await;

        f.engine.start(&t.id).await.unwrap();
        let running = task(&f, &t.id).await;
        assert!(running.is_timer_running);
        assert_eq!(running.status, TaskStatus::InProgress);
        assert_eq!(running.timer_start_time, Some(t0()));

        f.clock.advance_minutes(25);
        let outcome = f.engine.stop(&t.id).await.unwrap();
        assert_eq!(outcome.elapsed_minutes, 25);
        assert_eq!(outcome.entry.duration, 25);
        assert_eq!(outcome.entry.description, "Timer session: 25 minutes");
        assert_eq!(outcome.task.time_spent, 25);
        assert!(!outcome.task.is_timer_running);
        assert!(f.engine.active_timer(&t.id).is_none());
        assert!(f.store.list_active_timers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_unknown_task_is_not_found() {
        let f = fixture();
        let err = f.engine.start("missing").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn invalid_transitions_are_invalid_state() {
        let f = fixture();
        let t = add_task(&f, None).await;
        assert!(f.engine.stop(&t.id).await.unwrap_err().is_invalid_state());
        assert!(f.engine.pause(&t.id).await.unwrap_err().is_invalid_state());
        assert!(f.engine.resume(&t.id).await.unwrap_err().is_invalid_state());

        f.engine.start(&t.id).await.unwrap();
        assert!(f.engine.resume(&t.id).await.unwrap_err().is_invalid_state());
        f.engine.pause(&t.id).await.unwrap();
        assert!(f.engine.pause(&t.id).await.unwrap_err().is_invalid_state());
    }

    #[tokio::test]
    async fn tick_uses_base_plus_segment() {
        let f = fixture();
        let mut t = add_task(&f, None).await;
        t.time_spent = 40;
        f.store
            .update_task(
                &t.id,
                &TaskPatch {
                    time_spent: Some(40),
                    ..TaskPatch::default()
                },
            )
            .await
            .unwrap();

        f.engine.start(&t.id).await.unwrap();
        for _ in 0..3 {
            f.clock.advance_minutes(5);
            f.engine.tick().await.unwrap();
        }
        assert_eq!(task(&f, &t.id).await.time_spent, 55);
        assert_eq!(f.engine.current_elapsed_minutes(&t.id), 15);
    }

    #[tokio::test]
    async fn paused_timer_reports_frozen_elapsed() {
        let f = fixture();
        let t = add_task(&f, None).await;
        f.engine.start(&t.id).await.unwrap();
        f.clock.advance_minutes(12);
        f.engine.pause(&t.id).await.unwrap();
        f.clock.advance_minutes(30);

        assert_eq!(f.engine.current_elapsed_minutes(&t.id), 12);
        assert!(!f.engine.is_timer_running(&t.id));
        let paused = task(&f, &t.id).await;
        assert_eq!(paused.time_spent, 12);
        assert!(!paused.is_timer_running);

        f.engine.tick().await.unwrap();
        assert_eq!(task(&f, &t.id).await.time_spent, 12);
    }

    #[tokio::test]
    async fn time_up_fires_once_and_marks_overdue() {
        let f = fixture();
        let t = add_task(&f, Some(30)).await;
        f.engine.start(&t.id).await.unwrap();

        f.clock.advance_minutes(31);
        let first = f.engine.tick().await.unwrap();
        f.clock.advance_minutes(1);
        let second = f.engine.tick().await.unwrap();

        assert_eq!((first.timed_up, second.timed_up), (1, 0));
        assert_eq!(task(&f, &t.id).await.status, TaskStatus::Overdue);
        let ups = f
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, Event::TimerUp { .. }))
            .count();
        assert_eq!(ups, 1);
    }

    #[tokio::test]
    async fn time_up_notification_follows_timer() {
        let f = fixture();
        let t = add_task(&f, Some(45)).await;
        f.engine.start(&t.id).await.unwrap();
        let id = format!("time_up_{}", t.id);
        let scheduled = f.store.get_notification(&id).await.unwrap().unwrap();
        assert_eq!(scheduled.scheduled_time, t0() + chrono::Duration::minutes(45));
        assert!(scheduled.is_active);

        f.clock.advance_minutes(10);
        f.engine.stop(&t.id).await.unwrap();
        assert!(!f.store.get_notification(&id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn events_arrive_in_causal_order() {
        let f = fixture();
        let t = add_task(&f, None).await;
        f.engine.start(&t.id).await.unwrap();
        f.clock.advance_minutes(2);
        f.engine.pause(&t.id).await.unwrap();
        f.engine.resume(&t.id).await.unwrap();
        f.clock.advance_minutes(3);
        f.engine.stop(&t.id).await.unwrap();

        let kinds: Vec<&'static str> = f
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|e| match e {
                Event::TimerStarted { .. } => "started",
                Event::TimerPaused { .. } => "paused",
                Event::TimerResumed { .. } => "resumed",
                Event::TimerStopped { .. } => "stopped",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["started", "paused", "resumed", "stopped"]);
    }

    #[tokio::test]
    async fn recover_discards_snapshots_of_missing_tasks() {
        let f = fixture();
        let ghost = NewTask::titled("ghost").into_task(t0());
        f.store
            .set_active_timer(&ActiveTimer::started(&ghost, t0()))
            .await
            .unwrap();
        assert_eq!(f.engine.recover().await.unwrap(), 0);
        assert!(f.store.list_active_timers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_all_stops_every_timer() {
        let f = fixture();
        let a = add_task(&f, None).await;
        let b = add_task(&f, None).await;
        f.engine.start(&a.id).await.unwrap();
        f.engine.start(&b.id).await.unwrap();
        f.clock.advance_minutes(5);
        f.engine.pause(&b.id).await.unwrap();

        let outcomes = f.engine.stop_all().await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(f.engine.active_timers().is_empty());
        assert_eq!(task(&f, &a.id).await.time_spent, 5);
        assert_eq!(task(&f, &b.id).await.time_spent, 5);
    }

    #[tokio::test]
    async fn time_statistics_include_live_session() {
        let f = fixture();
        let t = add_task(&f, Some(60)).await;
        f.engine.start(&t.id).await.unwrap();
        f.clock.advance_minutes(20);
        f.engine.stop(&t.id).await.unwrap();
        f.engine.start(&t.id).await.unwrap();
        f.clock.advance_minutes(15);

        let stats = f.engine.task_time_statistics(&t.id).await.unwrap();
        assert_eq!(stats.total_time, 35);
        assert_eq!(stats.sessions_count, 2);
        assert_eq!(stats.current_session_time, 15);
        assert_eq!(stats.remaining_time, 25);
    }
}
