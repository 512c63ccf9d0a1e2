//! Time entries: immutable records of finished timer segments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::minutes_between;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeEntry {
    pub id: String,
    pub task_id: String,
    pub project_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Whole minutes, `end_time - start_time` truncated.
    pub duration: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl TimeEntry {
    pub fn for_segment(
        task_id: &str,
        project_id: Option<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        let duration = minutes_between(start_time, end_time);
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            project_id,
            start_time,
            end_time,
            duration,
            description: format!("Timer session: {duration} minutes"),
            created_at: end_time,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimeEntryFilter {
    pub task_id: Option<String>,
    pub project_id: Option<String>,
}

impl TimeEntryFilter {
    pub fn by_task(task_id: &str) -> Self {
        Self {
            task_id: Some(task_id.to_string()),
            project_id: None,
        }
    }

    pub fn by_project(project_id: &str) -> Self {
        Self {
            task_id: None,
            project_id: Some(project_id.to_string()),
        }
    }

    pub fn matches(&self, entry: &TimeEntry) -> bool {
        self.task_id.as_deref().map_or(true, |id| entry.task_id == id)
            && self
                .project_id
                .as_deref()
                .map_or(true, |id| entry.project_id.as_deref() == Some(id))
    }
}
