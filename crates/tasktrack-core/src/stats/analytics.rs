//! Project analytics.
//!
//! Pure functions of a project, its tasks, its time entries and the live
//! timers; nothing here touches the store or the clock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::project::Project;
use crate::task::{Task, TaskPriority, TaskStatus};
use crate::timer::{ActiveTimer, TimeEntry};

/// Width of the band around expected progress that still counts as on track.
const TIMELINE_BAND: f64 = 10.0;
const RECENT_ACTIVITY_DAYS: i64 = 7;
const RECENT_ACTIVITY_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimelineStatus {
    OnTrack,
    Overdue,
    BehindSchedule,
    AheadSchedule,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskCounts {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
    /// Status `overdue`, or due date passed on a task that is not closed.
    pub overdue: usize,
    pub completion_rate: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimeSummary {
    pub total_estimated: i64,
    /// Time entries plus the live elapsed time of running timers.
    pub total_actual: i64,
    /// `total_estimated / total_actual * 100`, 100 when nothing was tracked.
    pub efficiency: f64,
    /// Mean `time_spent` of completed tasks, rounded.
    pub average_task_time: i64,
    /// Live elapsed minutes of running timers.
    pub active_time: i64,
}

impl TimeSummary {
    pub fn efficiency_rounded(&self) -> i64 {
        self.efficiency.round() as i64
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriorityDistribution {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub urgent: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Timeline {
    pub status: TimelineStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
    pub days_overdue: Option<i64>,
    pub progress: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectAnalytics {
    pub project_id: String,
    pub project_name: String,
    pub task_stats: TaskCounts,
    pub time_stats: TimeSummary,
    pub priority_distribution: PriorityDistribution,
    pub timeline: Timeline,
    /// Up to five tasks updated in the last week, newest first.
    pub recent_activity: Vec<Task>,
    pub health_score: u8,
}

/// Inputs to [`health_score`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthInputs {
    pub progress: f64,
    pub efficiency: f64,
    pub overdue_tasks: usize,
    pub total_tasks: usize,
    pub timeline: TimelineStatus,
}

/// Composite 0-100 score.
///
/// The overdue penalty `30 * overdue / total` is rounded half away from
/// zero, so one overdue task out of four costs 8 points.
pub fn health_score(inputs: HealthInputs) -> u8 {
    let mut score: i64 = 100;

    if inputs.progress < 25.0 {
        score -= 20;
    } else if inputs.progress < 50.0 {
        score -= 10;
    }

    if inputs.efficiency < 80.0 {
        score -= 15;
    } else if inputs.efficiency < 90.0 {
        score -= 5;
    }

    if inputs.total_tasks > 0 {
        let ratio = inputs.overdue_tasks as f64 / inputs.total_tasks as f64;
        score -= (ratio * 30.0).round() as i64;
    }

    score += match inputs.timeline {
        TimelineStatus::Overdue => -25,
        TimelineStatus::BehindSchedule => -15,
        TimelineStatus::AheadSchedule => 5,
        TimelineStatus::OnTrack => 0,
    };

    score.clamp(0, 100) as u8
}

/// `completed / total * 100`, 0 for an empty set.
pub fn completion_percentage(tasks: &[Task]) -> f64 {
    if tasks.is_empty() {
        return 0.0;
    }
    let completed = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    completed as f64 / tasks.len() as f64 * 100.0
}

/// `estimated / actual * 100`, defined as 100 when `actual` is zero.
pub fn time_efficiency(total_estimated: i64, total_actual: i64) -> f64 {
    if total_actual <= 0 {
        100.0
    } else {
        total_estimated as f64 / total_actual as f64 * 100.0
    }
}

/// Compare progress with the linear expectation between start and end.
///
/// Returns the status plus `(days_remaining, days_overdue)`.
pub fn timeline_status(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    progress: f64,
    now: DateTime<Utc>,
) -> (TimelineStatus, Option<i64>, Option<i64>) {
    let Some(end) = end else {
        return (TimelineStatus::OnTrack, None, None);
    };

    if end < now {
        if progress < 100.0 {
            return (TimelineStatus::Overdue, None, Some((now - end).num_days()));
        }
        return (TimelineStatus::OnTrack, None, None);
    }
    if end == now {
        return (TimelineStatus::OnTrack, None, None);
    }

    let days_remaining = Some((end - now).num_days());
    let Some(start) = start else {
        return (TimelineStatus::OnTrack, days_remaining, None);
    };

    let total_days = (end - start).num_days();
    let days_passed = (now - start).num_days();
    let expected = if total_days > 0 {
        days_passed as f64 / total_days as f64 * 100.0
    } else {
        0.0
    };

    let status = if progress < expected - TIMELINE_BAND {
        TimelineStatus::BehindSchedule
    } else if progress > expected + TIMELINE_BAND {
        TimelineStatus::AheadSchedule
    } else {
        TimelineStatus::OnTrack
    };
    (status, days_remaining, None)
}

/// Build the analytics report for one project.
///
/// `timers` may contain timers of other projects; only running timers of
/// tasks in `tasks` contribute live time.
pub fn project_analytics(
    project: &Project,
    tasks: &[Task],
    entries: &[TimeEntry],
    timers: &[ActiveTimer],
    now: DateTime<Utc>,
) -> ProjectAnalytics {
    let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
    let completed = count(TaskStatus::Completed);
    let overdue = tasks.iter().filter(|t| t.is_overdue_at(now)).count();
    let progress = completion_percentage(tasks);

    let total_estimated = tasks
        .iter()
        .filter_map(|t| t.estimated_duration)
        .fold(0i64, i64::saturating_add);
    let tracked: i64 = entries.iter().map(|e| e.duration).sum();
    let active_time: i64 = timers
        .iter()
        .filter(|timer| timer.is_running && tasks.iter().any(|t| t.id == timer.task_id))
        .map(|timer| timer.live_elapsed(now))
        .sum();
    let total_actual = tracked + active_time;
    let efficiency = time_efficiency(total_estimated, total_actual);

    let average_task_time = if completed > 0 {
        let spent: i64 = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.time_spent)
            .sum();
        (spent as f64 / completed as f64).round() as i64
    } else {
        0
    };

    let priority = |p: TaskPriority| tasks.iter().filter(|t| t.priority == p).count();
    let priority_distribution = PriorityDistribution {
        low: priority(TaskPriority::Low),
        medium: priority(TaskPriority::Medium),
        high: priority(TaskPriority::High),
        urgent: priority(TaskPriority::Urgent),
    };

    let (status, days_remaining, days_overdue) =
        timeline_status(project.start_date, project.end_date, progress, now);

    let cutoff = now - Duration::days(RECENT_ACTIVITY_DAYS);
    let mut recent_activity: Vec<Task> = tasks
        .iter()
        .filter(|t| t.updated_at > cutoff)
        .cloned()
        .collect();
    recent_activity.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    recent_activity.truncate(RECENT_ACTIVITY_LIMIT);

    let health_score = health_score(HealthInputs {
        progress,
        efficiency,
        overdue_tasks: overdue,
        total_tasks: tasks.len(),
        timeline: status,
    });

    ProjectAnalytics {
        project_id: project.id.clone(),
        project_name: project.name.clone(),
        task_stats: TaskCounts {
            total: tasks.len(),
            completed,
            in_progress: count(TaskStatus::InProgress),
            pending: count(TaskStatus::Pending),
            overdue,
            completion_rate: progress.round() as u32,
        },
        time_stats: TimeSummary {
            total_estimated,
            total_actual,
            efficiency,
            average_task_time,
            active_time,
        },
        priority_distribution,
        timeline: Timeline {
            status,
            start_date: project.start_date,
            end_date: project.end_date,
            days_remaining,
            days_overdue,
            progress: progress.round() as u32,
        },
        recent_activity,
        health_score,
    }
}
