//! Notification scheduler.
//!
//! Keeps the set of pending notifications consistent with task, project and
//! timer changes. Store writes are authoritative; platform notifier calls
//! are advisory and only logged when they fail.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};

use super::{
    notification_id, NotificationKind, NotificationRequest, PlatformNotification,
    PlatformNotifier, ScheduledNotification,
};
use crate::clock::Clock;
use crate::error::{CoreError, Result, ValidationError};
use crate::events::{Event, EventBus};
use crate::project::Project;
use crate::storage::{NotificationsConfig, Store};
use crate::task::Task;

const DAILY_REMINDER_ID: &str = "daily_reminder";
const DAILY_INTERVAL_MIN: i64 = 24 * 60;

/// Data carried by a tapped notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TapPayload {
    pub notification_id: Option<String>,
    pub kind: Option<NotificationKind>,
    pub task_id: Option<String>,
    pub project_id: Option<String>,
}

fn humanize_minutes(minutes: i64) -> String {
    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };
    if minutes >= 60 && minutes % 60 == 0 {
        plural(minutes / 60, "hour")
    } else {
        plural(minutes, "minute")
    }
}

/// `at` shifted back by `minutes`, or `None` when out of range.
fn minutes_before(at: DateTime<Utc>, minutes: i64) -> Option<DateTime<Utc>> {
    Duration::try_minutes(minutes).and_then(|lead| at.checked_sub_signed(lead))
}

pub struct NotificationScheduler {
    store: Arc<dyn Store>,
    notifier: Arc<dyn PlatformNotifier>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    leads: NotificationsConfig,
    pending: Mutex<HashMap<String, ScheduledNotification>>,
}

impl NotificationScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn PlatformNotifier>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        leads: NotificationsConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            bus,
            clock,
            leads,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn pending_table(&self) -> std::sync::MutexGuard<'_, HashMap<String, ScheduledNotification>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Rebuild the in-memory pending set from active records.
    pub async fn load(&self) -> Result<usize> {
        let active = self.store.list_notifications(true).await?;
        let mut table = self.pending_table();
        table.clear();
        for n in active {
            table.insert(n.id.clone(), n);
        }
        tracing::debug!(count = table.len(), "loaded scheduled notifications");
        Ok(table.len())
    }

    /// Active notifications, soonest first.
    pub fn pending(&self) -> Vec<ScheduledNotification> {
        let mut all: Vec<_> = self.pending_table().values().cloned().collect();
        all.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time).then(a.id.cmp(&b.id)));
        all
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending_table().contains_key(id)
    }

    // ── Core operations ──

    /// Persist and hand a notification to the platform.
    ///
    /// A record with the same id is replaced. The target must be strictly
    /// in the future; otherwise nothing is persisted and the notifier is
    /// not called.
    pub async fn schedule(&self, request: NotificationRequest) -> Result<ScheduledNotification> {
        let now = self.clock.now();
        if request.scheduled_time <= now {
            return Err(CoreError::PastTime {
                id: request.id,
                scheduled_time: request.scheduled_time,
                now,
            });
        }

        let record = request.into_record(now);
        let replaced = self.pending_table().contains_key(&record.id);
        if replaced {
            if let Err(e) = self.notifier.cancel(&record.id).await {
                tracing::warn!(id = %record.id, error = %e, "failed to cancel superseded notification");
            }
        }

        self.store.upsert_notification(&record).await?;
        self.pending_table().insert(record.id.clone(), record.clone());

        if let Err(e) = self.notifier.schedule(&PlatformNotification::from(&record)).await {
            tracing::warn!(id = %record.id, error = %e, "platform notifier rejected notification");
        }
        tracing::info!(
            id = %record.id,
            at = %record.scheduled_time.to_rfc3339(),
            replaced,
            "notification scheduled"
        );
        Ok(record)
    }

    /// Deactivate a notification. Unknown or inactive ids are not an error.
    ///
    /// Returns whether an active record was deactivated.
    pub async fn cancel(&self, id: &str) -> Result<bool> {
        self.pending_table().remove(id);
        let deactivated = self.store.deactivate_notification(id).await?;
        if let Err(e) = self.notifier.cancel(id).await {
            tracing::warn!(id, error = %e, "platform notifier failed to cancel");
        }
        if deactivated {
            tracing::info!(id, "notification cancelled");
        }
        Ok(deactivated)
    }

    pub async fn cancel_kind(&self, kind: NotificationKind, entity_id: &str) -> Result<bool> {
        self.cancel(&notification_id(kind, entity_id)).await
    }

    /// Cancel every active notification attached to a task.
    pub async fn cancel_for_task(&self, task_id: &str) -> Result<usize> {
        let ids: Vec<String> = self
            .store
            .list_notifications(true)
            .await?
            .into_iter()
            .filter(|n| n.task_id.as_deref() == Some(task_id))
            .map(|n| n.id)
            .collect();
        for id in &ids {
            self.cancel(id).await?;
        }
        tracing::debug!(task_id, count = ids.len(), "cancelled task notifications");
        Ok(ids.len())
    }

    /// Cancel every active notification attached to a project.
    pub async fn cancel_for_project(&self, project_id: &str) -> Result<usize> {
        let ids: Vec<String> = self
            .store
            .list_notifications(true)
            .await?
            .into_iter()
            .filter(|n| n.project_id.as_deref() == Some(project_id))
            .map(|n| n.id)
            .collect();
        for id in &ids {
            self.cancel(id).await?;
        }
        tracing::debug!(project_id, count = ids.len(), "cancelled project notifications");
        Ok(ids.len())
    }

    pub async fn cancel_all(&self) -> Result<usize> {
        if let Err(e) = self.notifier.cancel_all().await {
            tracing::warn!(error = %e, "platform notifier failed to cancel all");
        }
        self.pending_table().clear();
        let mut count = 0;
        for n in self.store.list_notifications(true).await? {
            if self.store.deactivate_notification(&n.id).await? {
                count += 1;
            }
        }
        tracing::info!(count, "all notifications cleared");
        Ok(count)
    }

    /// Show a notification right away, unless notifications are disabled.
    ///
    /// Immediate notifications are not persisted. Returns whether the
    /// notifier accepted it.
    pub async fn notify_now(
        &self,
        kind: NotificationKind,
        entity_id: &str,
        title: &str,
        message: &str,
    ) -> Result<bool> {
        let settings = self.store.get_settings().await?;
        if !settings.notifications.enabled {
            tracing::debug!(kind = kind.as_str(), entity_id, "notifications disabled, skipping");
            return Ok(false);
        }
        let notification = PlatformNotification {
            id: notification_id(kind, entity_id),
            title: title.to_string(),
            body: message.to_string(),
            fire_at: self.clock.now(),
            repeat: None,
        };
        match self.notifier.schedule(&notification).await {
            Ok(()) => {
                tracing::info!(id = %notification.id, "immediate notification sent");
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(id = %notification.id, error = %e, "immediate notification failed");
                Ok(false)
            }
        }
    }

    // ── Derivation from domain changes ──

    /// Reconcile the `task_start` reminder with the task's start time.
    ///
    /// Schedules when the reminder instant is still ahead, otherwise makes
    /// sure no stale reminder stays active.
    pub async fn on_task_start(&self, task: &Task) -> Result<Option<ScheduledNotification>> {
        let lead = self.leads.task_start_lead_min;
        let reminder = task
            .start_time
            .and_then(|start| minutes_before(start, lead))
            .filter(|at| *at > self.clock.now());
        let Some(at) = reminder else {
            self.cancel_kind(NotificationKind::TaskStart, &task.id).await?;
            return Ok(None);
        };
        let request = NotificationRequest::new(
            NotificationKind::TaskStart,
            notification_id(NotificationKind::TaskStart, &task.id),
            "Task Starting Soon",
            format!(
                "\"{}\" is scheduled to start in {}",
                task.title,
                humanize_minutes(lead)
            ),
            at,
        )
        .for_task(&task.id, task.project_id.as_deref())
        .with_payload(serde_json::json!({ "task_id": task.id, "start_time": task.start_time }));
        self.schedule(request).await.map(Some)
    }

    /// Reconcile the `task_due` reminder with the task's due date.
    pub async fn on_task_due(&self, task: &Task) -> Result<Option<ScheduledNotification>> {
        let lead = self.leads.task_due_lead_min;
        let reminder = task
            .due_date
            .filter(|_| !task.status.is_closed())
            .and_then(|due| minutes_before(due, lead))
            .filter(|at| *at > self.clock.now());
        let Some(at) = reminder else {
            self.cancel_kind(NotificationKind::TaskDue, &task.id).await?;
            return Ok(None);
        };
        let request = NotificationRequest::new(
            NotificationKind::TaskDue,
            notification_id(NotificationKind::TaskDue, &task.id),
            "Task Due Soon",
            format!("\"{}\" is due in {}", task.title, humanize_minutes(lead)),
            at,
        )
        .for_task(&task.id, task.project_id.as_deref())
        .with_payload(serde_json::json!({ "task_id": task.id, "due_date": task.due_date }));
        self.schedule(request).await.map(Some)
    }

    /// Schedule `time_up` at `started_at + estimated_duration`.
    pub async fn on_timer_started(
        &self,
        task: &Task,
        started_at: DateTime<Utc>,
    ) -> Result<Option<ScheduledNotification>> {
        let Some(estimate) = task.estimated_duration.filter(|m| *m > 0) else {
            return Ok(None);
        };
        let fire_at = Duration::try_minutes(estimate)
            .and_then(|d| started_at.checked_add_signed(d))
            .ok_or_else(|| {
                ValidationError::invalid(
                    "estimated_duration",
                    format!("{estimate} minutes is out of range"),
                )
            })?;
        let request = NotificationRequest::new(
            NotificationKind::TimeUp,
            notification_id(NotificationKind::TimeUp, &task.id),
            "Time Up!",
            format!("Estimated time for \"{}\" has elapsed", task.title),
            fire_at,
        )
        .for_task(&task.id, task.project_id.as_deref())
        .with_payload(serde_json::json!({ "task_id": task.id, "estimated_duration": estimate }));
        self.schedule(request).await.map(Some)
    }

    /// Reconcile the `project_deadline` reminder with the project's end date.
    pub async fn on_project_end_date(
        &self,
        project: &Project,
    ) -> Result<Option<ScheduledNotification>> {
        let lead_hours = self.leads.project_deadline_lead_hours;
        let reminder = project
            .end_date
            .and_then(|end| minutes_before(end, lead_hours.saturating_mul(60)))
            .filter(|at| *at > self.clock.now());
        let Some(at) = reminder else {
            self.cancel_kind(NotificationKind::ProjectDeadline, &project.id)
                .await?;
            return Ok(None);
        };
        let message = if lead_hours == 24 {
            format!("\"{}\" deadline is tomorrow", project.name)
        } else {
            format!(
                "\"{}\" deadline is in {}",
                project.name,
                humanize_minutes(lead_hours * 60)
            )
        };
        let request = NotificationRequest::new(
            NotificationKind::ProjectDeadline,
            notification_id(NotificationKind::ProjectDeadline, &project.id),
            "Project Deadline Approaching",
            message,
            at,
        )
        .for_project(&project.id)
        .with_payload(serde_json::json!({ "project_id": project.id, "deadline": project.end_date }));
        self.schedule(request).await.map(Some)
    }

    /// Recurring reminder at the configured local hour tomorrow.
    ///
    /// Skipped (returns `None`) when notifications are disabled or nothing
    /// is pending.
    pub async fn schedule_daily_reminder(
        &self,
        pending_count: usize,
    ) -> Result<Option<ScheduledNotification>> {
        let settings = self.store.get_settings().await?;
        if !settings.notifications.enabled || pending_count == 0 {
            return Ok(None);
        }
        let local_now = self.clock.now().with_timezone(&Local);
        let tomorrow = local_now.date_naive() + Duration::days(1);
        let at = tomorrow
            .and_hms_opt(self.leads.daily_reminder_hour, 0, 0)
            .and_then(|naive| naive.and_local_timezone(Local).earliest())
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| {
                CoreError::InvalidState(format!(
                    "no local time for hour {} on {tomorrow}",
                    self.leads.daily_reminder_hour
                ))
            })?;
        let request = NotificationRequest::new(
            NotificationKind::DailyReminder,
            DAILY_REMINDER_ID,
            "Daily Task Reminder",
            format!("You have {pending_count} pending tasks for today"),
            at,
        )
        .recurring(DAILY_INTERVAL_MIN)
        .with_payload(serde_json::json!({ "pending_tasks_count": pending_count }));
        self.schedule(request).await.map(Some)
    }

    /// Retire notifications whose time has passed.
    ///
    /// One-shot records are deactivated; recurring ones move forward by
    /// their repeat granularity until they are in the future again.
    pub async fn sweep_fired(&self, now: DateTime<Utc>) -> Result<usize> {
        let due: Vec<ScheduledNotification> = self
            .pending_table()
            .values()
            .filter(|n| n.scheduled_time <= now)
            .cloned()
            .collect();

        for mut n in due.iter().cloned() {
            match n.repeat() {
                Some(repeat) => {
                    let step = repeat.duration();
                    while n.scheduled_time <= now {
                        n.scheduled_time += step;
                    }
                    self.store.upsert_notification(&n).await?;
                    self.pending_table().insert(n.id.clone(), n);
                }
                None => {
                    self.store.deactivate_notification(&n.id).await?;
                    self.pending_table().remove(&n.id);
                }
            }
        }
        if !due.is_empty() {
            tracing::debug!(count = due.len(), "swept fired notifications");
        }
        Ok(due.len())
    }

    /// Publish a tap so the host can navigate to the entity.
    pub fn handle_tap(&self, payload: TapPayload) {
        tracing::info!(
            id = ?payload.notification_id,
            task_id = ?payload.task_id,
            project_id = ?payload.project_id,
            "notification tapped"
        );
        self.bus.publish(&Event::NotificationTapped {
            notification_id: payload.notification_id,
            kind: payload.kind,
            task_id: payload.task_id,
            project_id: payload.project_id,
            at: self.clock.now(),
        });
    }

    /// Immediate alerts for overdue tasks and tasks starting within the lead window.
    pub async fn check_due_tasks(&self, tasks: &[Task]) -> Result<usize> {
        let now = self.clock.now();
        let lead = self.leads.task_start_lead_min;
        let mut sent = 0;
        for task in tasks {
            let overdue = !task.status.is_closed() && task.due_date.is_some_and(|d| d < now);
            if overdue
                && self
                    .notify_now(
                        NotificationKind::TaskOverdue,
                        &task.id,
                        "Task Overdue",
                        &format!("\"{}\" is overdue", task.title),
                    )
                    .await?
            {
                sent += 1;
            }

            let starting_soon = task
                .start_time
                .is_some_and(|s| s > now && minutes_before(s, lead).is_some_and(|at| at < now));
            if starting_soon
                && self
                    .notify_now(
                        NotificationKind::TaskStart,
                        &task.id,
                        "Task Starting Soon",
                        &format!("\"{}\" starts in {}", task.title, humanize_minutes(lead)),
                    )
                    .await?
            {
                sent += 1;
            }
        }
        Ok(sent)
    }
}

impl std::fmt::Debug for NotificationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationScheduler")
            .field("pending", &self.pending_table().len())
            .field("leads", &self.leads)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notification::{RecordingNotifier, RepeatInterval};
    use crate::project::NewProject;
    use crate::storage::SqliteStore;
    use crate::task::NewTask;
    use chrono::TimeZone;

    struct Fixture {
        clock: ManualClock,
        store: Arc<SqliteStore>,
        notifier: Arc<RecordingNotifier>,
        bus: Arc<EventBus>,
        scheduler: NotificationScheduler,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 8, 0, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(t0());
        let store = Arc::new(
            SqliteStore::open_memory()
                .unwrap()
                .with_clock(Arc::new(clock.clone())),
        );
        let notifier = Arc::new(RecordingNotifier::new());
        let bus = Arc::new(EventBus::new());
        let scheduler = NotificationScheduler::new(
            store.clone(),
            notifier.clone(),
            bus.clone(),
            Arc::new(clock.clone()),
            NotificationsConfig::default(),
        );
        Fixture {
            clock,
            store,
            notifier,
            bus,
            scheduler,
        }
    }

    fn request_at(id: &str, at: DateTime<Utc>) -> NotificationRequest {
        NotificationRequest::new(NotificationKind::TaskDue, id, "title", "message", at)
    }

    #[tokio::test]
    async fn past_time_is_rejected_without_side_effects() {
        let f = fixture();
        for at in [t0(), t0() - Duration::minutes(1)] {
            let err = f.scheduler.schedule(request_at("n1", at)).await.unwrap_err();
            assert!(matches!(err, CoreError::PastTime { .. }));
        }
        assert!(f.store.list_notifications(false).await.unwrap().is_empty());
        assert!(f.notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn same_id_replaces_previous_record() {
        let f = fixture();
        f.scheduler
            .schedule(request_at("n1", t0() + Duration::hours(1)))
            .await
            .unwrap();
        f.scheduler
            .schedule(request_at("n1", t0() + Duration::hours(2)))
            .await
            .unwrap();

        let active = f.store.list_notifications(true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].scheduled_time, t0() + Duration::hours(2));
        assert_eq!(f.notifier.cancelled(), vec!["n1".to_string()]);
        assert_eq!(f.scheduler.pending().len(), 1);
    }

    #[tokio::test]
    async fn notifier_failure_keeps_the_record() {
        let f = fixture();
        f.notifier.set_failing(true);
        f.scheduler
            .schedule(request_at("n1", t0() + Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(f.store.list_notifications(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancel_is_quiet_for_unknown_ids() {
        let f = fixture();
        assert!(!f.scheduler.cancel("nope").await.unwrap());
        f.scheduler
            .schedule(request_at("n1", t0() + Duration::hours(1)))
            .await
            .unwrap();
        assert!(f.scheduler.cancel("n1").await.unwrap());
        assert!(!f.scheduler.cancel("n1").await.unwrap());
        let all = f.store.list_notifications(false).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].is_active);
    }

    #[tokio::test]
    async fn task_reminders_use_configured_leads() {
        let f = fixture();
        let mut new = NewTask::titled("Standup");
        new.start_time = Some(t0() + Duration::hours(2));
        new.due_date = Some(t0() + Duration::hours(5));
        let task = new.into_task(t0());

        let start = f.scheduler.on_task_start(&task).await.unwrap().unwrap();
        assert_eq!(start.id, format!("task_start_{}", task.id));
        assert_eq!(start.scheduled_time, t0() + Duration::minutes(105));
        assert!(start.message.contains("15 minutes"));

        let due = f.scheduler.on_task_due(&task).await.unwrap().unwrap();
        assert_eq!(due.scheduled_time, t0() + Duration::hours(4));
        assert_eq!(due.message, "\"Standup\" is due in 1 hour");
    }

    #[tokio::test]
    async fn oversized_estimate_is_rejected_not_scheduled() {
        let f = fixture();
        let mut new = NewTask::titled("Forever");
        new.estimated_duration = Some(i64::MAX / 2);
        let task = new.into_task(t0());

        let err = f.scheduler.on_timer_started(&task, t0()).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(f.store.list_notifications(false).await.unwrap().is_empty());
        assert!(f.notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_lead_skips_the_reminder() {
        let mut f = fixture();
        f.scheduler.leads.task_start_lead_min = i64::MAX;
        let mut new = NewTask::titled("Standup");
        new.start_time = Some(t0() + Duration::hours(2));
        let task = new.into_task(t0());

        assert!(f.scheduler.on_task_start(&task).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clearing_a_field_cancels_its_reminder() {
        let f = fixture();
        let mut new = NewTask::titled("Ship");
        new.due_date = Some(t0() + Duration::hours(5));
        let mut task = new.into_task(t0());
        f.scheduler.on_task_due(&task).await.unwrap();

        task.due_date = None;
        assert!(f.scheduler.on_task_due(&task).await.unwrap().is_none());
        assert!(f.store.list_notifications(true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reminder_inside_lead_window_is_not_scheduled() {
        let f = fixture();
        let mut new = NewTask::titled("Soon");
        new.start_time = Some(t0() + Duration::minutes(10));
        let task = new.into_task(t0());
        assert!(f.scheduler.on_task_start(&task).await.unwrap().is_none());
        assert!(f.notifier.scheduled().is_empty());
    }

    #[tokio::test]
    async fn project_deadline_is_a_day_ahead() {
        let f = fixture();
        let mut new = NewProject::named("Launch");
        new.end_date = Some(t0() + Duration::days(3));
        let project = new.into_project(t0());
        let n = f.scheduler.on_project_end_date(&project).await.unwrap().unwrap();
        assert_eq!(n.scheduled_time, t0() + Duration::days(2));
        assert_eq!(n.message, "\"Launch\" deadline is tomorrow");
        assert_eq!(n.project_id.as_deref(), Some(project.id.as_str()));
    }

    #[tokio::test]
    async fn cancel_for_task_only_touches_that_task() {
        let f = fixture();
        let mut a = NewTask::titled("a");
        a.due_date = Some(t0() + Duration::hours(5));
        let a = a.into_task(t0());
        let mut b = NewTask::titled("b");
        b.due_date = Some(t0() + Duration::hours(5));
        let b = b.into_task(t0());
        f.scheduler.on_task_due(&a).await.unwrap();
        f.scheduler.on_task_due(&b).await.unwrap();

        assert_eq!(f.scheduler.cancel_for_task(&a.id).await.unwrap(), 1);
        let active = f.store.list_notifications(true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].task_id.as_deref(), Some(b.id.as_str()));
    }

    #[tokio::test]
    async fn sweep_retires_one_shots_and_advances_recurring() {
        let f = fixture();
        f.scheduler
            .schedule(request_at("once", t0() + Duration::minutes(30)))
            .await
            .unwrap();
        f.scheduler
            .schedule(request_at("hourly", t0() + Duration::minutes(30)).recurring(90))
            .await
            .unwrap();

        f.clock.advance_minutes(45);
        assert_eq!(f.scheduler.sweep_fired(f.clock.now()).await.unwrap(), 2);

        let active = f.store.list_notifications(true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "hourly");
        assert_eq!(active[0].repeat(), Some(RepeatInterval::Hour));
        assert_eq!(active[0].scheduled_time, t0() + Duration::minutes(90));
    }

    #[tokio::test]
    async fn notify_now_respects_disabled_setting() {
        let f = fixture();
        assert!(f
            .scheduler
            .notify_now(NotificationKind::TaskOverdue, "t", "Task Overdue", "late")
            .await
            .unwrap());

        let mut settings = f.store.get_settings().await.unwrap();
        settings.notifications.enabled = false;
        f.store.update_settings(&settings).await.unwrap();
        assert!(!f
            .scheduler
            .notify_now(NotificationKind::TaskOverdue, "t", "Task Overdue", "late")
            .await
            .unwrap());
        assert_eq!(f.notifier.scheduled().len(), 1);
    }

    #[tokio::test]
    async fn daily_reminder_is_recurring_and_skipped_when_idle() {
        let f = fixture();
        assert!(f.scheduler.schedule_daily_reminder(0).await.unwrap().is_none());
        let n = f.scheduler.schedule_daily_reminder(3).await.unwrap().unwrap();
        assert_eq!(n.id, "daily_reminder");
        assert!(n.scheduled_time > t0());
        assert_eq!(n.repeat(), Some(RepeatInterval::Day));
        assert_eq!(n.message, "You have 3 pending tasks for today");
    }

    #[tokio::test]
    async fn check_due_tasks_alerts_overdue_and_starting_soon() {
        let f = fixture();
        let mut late = NewTask::titled("late");
        late.due_date = Some(t0() - Duration::hours(1));
        let mut soon = NewTask::titled("soon");
        soon.start_time = Some(t0() + Duration::minutes(5));
        let mut fine = NewTask::titled("fine");
        fine.start_time = Some(t0() + Duration::hours(3));
        let tasks = vec![late.into_task(t0()), soon.into_task(t0()), fine.into_task(t0())];

        assert_eq!(f.scheduler.check_due_tasks(&tasks).await.unwrap(), 2);
        let titles: Vec<_> = f.notifier.scheduled().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["Task Overdue", "Task Starting Soon"]);
    }

    #[tokio::test]
    async fn tap_publishes_event() {
        let f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        f.bus.subscribe(move |e: &Event| -> std::result::Result<(), crate::events::ListenerError> {
            sink.lock().unwrap().push(e.clone());
            Ok(())
        });
        f.scheduler.handle_tap(TapPayload {
            task_id: Some("t1".into()),
            kind: Some(NotificationKind::TaskDue),
            ..TapPayload::default()
        });
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].task_id(), Some("t1"));
    }

    #[tokio::test]
    async fn load_rebuilds_pending_from_store() {
        let f = fixture();
        f.scheduler
            .schedule(request_at("n1", t0() + Duration::hours(1)))
            .await
            .unwrap();
        let fresh = NotificationScheduler::new(
            f.store.clone(),
            f.notifier.clone(),
            f.bus.clone(),
            Arc::new(f.clock.clone()),
            NotificationsConfig::default(),
        );
        assert_eq!(fresh.load().await.unwrap(), 1);
        assert!(fresh.is_pending("n1"));
    }

    #[tokio::test]
    async fn cancel_all_deactivates_every_record() {
        let f = fixture();
        for id in ["n1", "n2"] {
            f.scheduler
                .schedule(request_at(id, t0() + Duration::hours(1)))
                .await
                .unwrap();
        }
        assert_eq!(f.scheduler.cancel_all().await.unwrap(), 2);
        assert!(f.scheduler.pending().is_empty());
        assert!(f.store.list_notifications(true).await.unwrap().is_empty());
        assert!(f
            .notifier
            .calls()
            .iter()
            .any(|c| matches!(c, crate::notification::NotifierCall::CancelAll)));
    }
}
