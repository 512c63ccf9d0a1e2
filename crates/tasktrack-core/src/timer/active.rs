//! Active timer records.
//!
//! An [`ActiveTimer`] is the engine's view of one task's running or paused
//! timer. The same struct is persisted as the recovery snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::minutes_between;
use crate::task::Task;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveTimer {
    pub task_id: String,
    pub project_id: Option<String>,
    /// Start of the current segment (reset on resume).
    pub start_time: DateTime<Utc>,
    /// Minutes in the current segment as of the last reconciliation.
    pub elapsed_time: i64,
    pub is_running: bool,
    pub paused_at: Option<DateTime<Utc>>,
    /// `Task::time_spent` excluding the current segment.
    #[serde(default)]
    pub base_time_spent: i64,
    /// The time-up crossing has already fired for this timer.
    #[serde(default)]
    pub time_up_notified: bool,
}

impl ActiveTimer {
    pub fn started(task: &Task, now: DateTime<Utc>) -> Self {
        Self {
            task_id: task.id.clone(),
            project_id: task.project_id.clone(),
            start_time: now,
            elapsed_time: 0,
            is_running: true,
            paused_at: None,
            base_time_spent: task.time_spent,
            time_up_notified: false,
        }
    }

    /// Minutes in the current segment: live while running, frozen while paused.
    pub fn live_elapsed(&self, now: DateTime<Utc>) -> i64 {
        if self.is_running {
            minutes_between(self.start_time, now)
        } else {
            self.elapsed_time
        }
    }

    /// Up-to-date `time_spent` for the task this timer belongs to.
    ///
    /// A paused timer has already folded its segment into the base.
    pub fn live_time_spent(&self, now: DateTime<Utc>) -> i64 {
        if self.is_running {
            self.base_time_spent + self.live_elapsed(now)
        } else {
            self.base_time_spent
        }
    }
}
