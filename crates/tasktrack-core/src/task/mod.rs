//! Task types.
//!
//! A task carries its cumulative `time_spent` and a denormalized view of its
//! timer (`is_timer_running`, `timer_start_time`). Only the timer engine
//! writes those fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task status.
///
/// ```text
///   PENDING ──start──> IN_PROGRESS ──complete──> COMPLETED
///      |                  |   ^
///      |          time-up |   | start
///      |                  v   |
///      +──────────────> OVERDUE
///   (any non-terminal) ──cancel──> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
    Overdue,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Overdue => "overdue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "cancelled" => Some(TaskStatus::Cancelled),
            "overdue" => Some(TaskStatus::Overdue),
            _ => None,
        }
    }

    /// Completed and cancelled tasks no longer accrue due/overdue state.
    pub fn is_closed(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            "urgent" => Some(TaskPriority::Urgent),
            _ => None,
        }
    }
}

/// Upper bound for `estimated_duration`: one leap year of minutes.
pub const MAX_ESTIMATED_DURATION: i64 = 366 * 24 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub project_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    /// Estimated duration in minutes.
    pub estimated_duration: Option<i64>,
    /// Cumulative minutes worked, including the folded part of a live segment.
    pub time_spent: i64,
    pub is_timer_running: bool,
    pub timer_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    pub project_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_duration: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn into_task(self, now: DateTime<Utc>) -> Task {
        Task {
            id: Uuid::new_v4().to_string(),
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            project_id: self.project_id,
            start_time: self.start_time,
            due_date: self.due_date,
            estimated_duration: self.estimated_duration,
            time_spent: 0,
            is_timer_running: false,
            timer_start_time: None,
            tags: self.tags,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update. `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub project_id: Option<Option<String>>,
    pub start_time: Option<Option<DateTime<Utc>>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub estimated_duration: Option<Option<i64>>,
    pub time_spent: Option<i64>,
    pub is_timer_running: Option<bool>,
    pub timer_start_time: Option<Option<DateTime<Utc>>>,
    pub tags: Option<Vec<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }
}

impl Task {
    /// Apply a patch in place and bump `updated_at`.
    pub fn apply(&mut self, patch: &TaskPatch, now: DateTime<Utc>) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(project_id) = &patch.project_id {
            self.project_id = project_id.clone();
        }
        if let Some(start_time) = patch.start_time {
            self.start_time = start_time;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(estimated) = patch.estimated_duration {
            self.estimated_duration = estimated;
        }
        if let Some(time_spent) = patch.time_spent {
            self.time_spent = time_spent.max(0);
        }
        if let Some(running) = patch.is_timer_running {
            self.is_timer_running = running;
        }
        if let Some(timer_start) = patch.timer_start_time {
            self.timer_start_time = timer_start;
        }
        if let Some(tags) = &patch.tags {
            self.tags = tags.clone();
        }
        self.updated_at = now;
    }

    /// Overdue by status, or by a passed due date on an open task.
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        if self.status == TaskStatus::Overdue {
            return true;
        }
        !self.status.is_closed() && self.due_date.is_some_and(|due| due < now)
    }
}

/// Store-side filter for listing tasks. Empty filter lists everything.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub timer_running: Option<bool>,
}

impl TaskFilter {
    pub fn by_project(project_id: &str) -> Self {
        Self {
            project_id: Some(project_id.to_string()),
            ..Self::default()
        }
    }

    pub fn by_status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(project_id) = &self.project_id {
            if task.project_id.as_deref() != Some(project_id.as_str()) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(running) = self.timer_running {
            if task.is_timer_running != running {
                return false;
            }
        }
        true
    }
}
