//! Scheduled notifications.
//!
//! Records are keyed by a deterministic id derived from `(kind, entity id)`,
//! so scheduling the same kind for the same task twice replaces the first
//! record instead of stacking a duplicate.

mod platform;
mod scheduler;

pub use platform::{
    LogNotifier, NotifierCall, PlatformNotification, PlatformNotifier, RecordingNotifier,
};
pub use scheduler::{NotificationScheduler, TapPayload};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskStart,
    TaskDue,
    TimeUp,
    ProjectDeadline,
    DailyReminder,
    ProjectCompleted,
    TaskOverdue,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TaskStart => "task_start",
            NotificationKind::TaskDue => "task_due",
            NotificationKind::TimeUp => "time_up",
            NotificationKind::ProjectDeadline => "project_deadline",
            NotificationKind::DailyReminder => "daily_reminder",
            NotificationKind::ProjectCompleted => "project_completed",
            NotificationKind::TaskOverdue => "task_overdue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "task_start" => Some(NotificationKind::TaskStart),
            "task_due" => Some(NotificationKind::TaskDue),
            "time_up" => Some(NotificationKind::TimeUp),
            "project_deadline" => Some(NotificationKind::ProjectDeadline),
            "daily_reminder" => Some(NotificationKind::DailyReminder),
            "project_completed" => Some(NotificationKind::ProjectCompleted),
            "task_overdue" => Some(NotificationKind::TaskOverdue),
            _ => None,
        }
    }
}

/// Deterministic record id, e.g. `time_up_<task id>`.
pub fn notification_id(kind: NotificationKind, entity_id: &str) -> String {
    format!("{}_{}", kind.as_str(), entity_id)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledNotification {
    pub id: String,
    pub task_id: Option<String>,
    pub project_id: Option<String>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub scheduled_time: DateTime<Utc>,
    pub is_recurring: bool,
    /// Minutes between repeats.
    pub recurring_interval: Option<i64>,
    pub is_active: bool,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ScheduledNotification {
    pub fn repeat(&self) -> Option<RepeatInterval> {
        if !self.is_recurring {
            return None;
        }
        self.recurring_interval.and_then(RepeatInterval::from_minutes)
    }
}

/// What a caller asks the scheduler to schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub id: String,
    pub task_id: Option<String>,
    pub project_id: Option<String>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub scheduled_time: DateTime<Utc>,
    /// Minutes; `Some` makes the notification recurring.
    pub recurring_interval: Option<i64>,
    pub payload: serde_json::Value,
}

impl NotificationRequest {
    pub fn new(
        kind: NotificationKind,
        id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        scheduled_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            task_id: None,
            project_id: None,
            kind,
            title: title.into(),
            message: message.into(),
            scheduled_time,
            recurring_interval: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn for_task(mut self, task_id: &str, project_id: Option<&str>) -> Self {
        self.task_id = Some(task_id.to_string());
        self.project_id = project_id.map(str::to_string);
        self
    }

    pub fn for_project(mut self, project_id: &str) -> Self {
        self.project_id = Some(project_id.to_string());
        self
    }

    pub fn recurring(mut self, interval_minutes: i64) -> Self {
        self.recurring_interval = Some(interval_minutes);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub(crate) fn into_record(self, now: DateTime<Utc>) -> ScheduledNotification {
        ScheduledNotification {
            id: self.id,
            task_id: self.task_id,
            project_id: self.project_id,
            kind: self.kind,
            title: self.title,
            message: self.message,
            scheduled_time: self.scheduled_time,
            is_recurring: self.recurring_interval.is_some(),
            recurring_interval: self.recurring_interval,
            is_active: true,
            payload: self.payload,
            created_at: now,
        }
    }
}

/// Repeat granularity understood by platform notifiers.
///
/// Intervals are rounded *down* to the nearest granularity: 90 minutes
/// repeats hourly, 36 hours repeats daily, 10 days repeats weekly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RepeatInterval {
    Minute,
    Hour,
    Day,
    Week,
}

impl RepeatInterval {
    pub fn from_minutes(minutes: i64) -> Option<Self> {
        const HOUR: i64 = 60;
        const DAY: i64 = 24 * HOUR;
        const WEEK: i64 = 7 * DAY;
        match minutes {
            m if m <= 0 => None,
            m if m >= WEEK => Some(RepeatInterval::Week),
            m if m >= DAY => Some(RepeatInterval::Day),
            m if m >= HOUR => Some(RepeatInterval::Hour),
            _ => Some(RepeatInterval::Minute),
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            RepeatInterval::Minute => Duration::minutes(1),
            RepeatInterval::Hour => Duration::hours(1),
            RepeatInterval::Day => Duration::days(1),
            RepeatInterval::Week => Duration::weeks(1),
        }
    }
}
