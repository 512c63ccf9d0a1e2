//! Project types.
//!
//! Aggregated fields (`progress`, `total_estimated_time`, `total_actual_time`)
//! are derived from the project's tasks by the task manager and are never
//! accepted as input through [`NewProject`] or [`ProjectPatch`].

pub mod templates;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::{Task, TaskStatus};

pub use templates::{ProjectTemplate, TemplateTask};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Active,
    OnHold,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ProjectStatus::Active),
            "on_hold" => Some(ProjectStatus::OnHold),
            "completed" => Some(ProjectStatus::Completed),
            "cancelled" => Some(ProjectStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub color: String,
    pub status: ProjectStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub total_estimated_time: i64,
    pub total_actual_time: i64,
    /// 0..=100, derived from task completion.
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_PROJECT_COLOR: &str = "#007AFF";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub color: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl NewProject {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn into_project(self, now: DateTime<Utc>) -> Project {
        Project {
            id: Uuid::new_v4().to_string(),
            name: self.name,
            description: self.description,
            color: self.color.unwrap_or_else(|| DEFAULT_PROJECT_COLOR.to_string()),
            status: ProjectStatus::Active,
            start_date: self.start_date,
            end_date: self.end_date,
            total_estimated_time: 0,
            total_actual_time: 0,
            progress: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update. `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<Option<DateTime<Utc>>>,
    pub end_date: Option<Option<DateTime<Utc>>>,
    /// Set only by the task manager; rejected in caller patches.
    pub derived: Option<DerivedTotals>,
}

/// Aggregates recomputed from tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedTotals {
    pub progress: u8,
    pub total_estimated_time: i64,
    pub total_actual_time: i64,
}

impl DerivedTotals {
    /// `live_time_spent` maps a task to its up-to-date minutes worked.
    pub fn from_tasks<F>(tasks: &[Task], live_time_spent: F) -> Self
    where
        F: Fn(&Task) -> i64,
    {
        let completed = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let progress = if tasks.is_empty() {
            0
        } else {
            (completed as f64 / tasks.len() as f64 * 100.0).round() as u8
        };
        Self {
            progress,
            total_estimated_time: tasks
                .iter()
                .filter_map(|t| t.estimated_duration)
                .fold(0, i64::saturating_add),
            total_actual_time: tasks.iter().map(live_time_spent).sum(),
        }
    }
}

impl ProjectPatch {
    pub fn derived(totals: DerivedTotals) -> Self {
        Self {
            derived: Some(totals),
            ..Self::default()
        }
    }
}

impl Project {
    pub fn apply(&mut self, patch: &ProjectPatch, now: DateTime<Utc>) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(color) = &patch.color {
            self.color = color.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(start_date) = patch.start_date {
            self.start_date = start_date;
        }
        if let Some(end_date) = patch.end_date {
            self.end_date = end_date;
        }
        if let Some(totals) = patch.derived {
            self.progress = totals.progress.min(100);
            self.total_estimated_time = totals.total_estimated_time;
            self.total_actual_time = totals.total_actual_time;
        }
        self.updated_at = now;
    }
}
