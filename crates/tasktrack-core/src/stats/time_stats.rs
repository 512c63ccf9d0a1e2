//! Per-task and per-project time statistics.

use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskStatus};
use crate::timer::TimeEntry;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskTimeStatistics {
    pub task_id: String,
    /// Recorded entries plus the current session.
    pub total_time: i64,
    pub sessions_count: usize,
    pub estimated_time: Option<i64>,
    pub remaining_time: i64,
    pub is_overtime: bool,
    pub current_session_time: i64,
    pub time_entries: Vec<TimeEntry>,
}

impl TaskTimeStatistics {
    /// `current_session` is the active timer's elapsed minutes (0 when idle).
    pub fn compute(task: &Task, entries: Vec<TimeEntry>, current_session: i64) -> Self {
        let recorded: i64 = entries.iter().map(|e| e.duration).sum();
        let total_time = recorded + current_session;
        let estimate = task.estimated_duration.filter(|m| *m > 0);
        Self {
            task_id: task.id.clone(),
            total_time,
            sessions_count: entries.len() + usize::from(current_session > 0),
            estimated_time: task.estimated_duration,
            remaining_time: estimate.map_or(0, |est| (est - total_time).max(0)),
            is_overtime: estimate.is_some_and(|est| total_time > est),
            current_session_time: current_session,
            time_entries: entries,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectTimeStatistics {
    pub project_id: String,
    pub total_time: i64,
    pub estimated_time: i64,
    pub remaining_time: i64,
    pub is_overtime: bool,
    pub tasks_count: usize,
    pub completed_tasks_count: usize,
    pub active_timers_count: usize,
}

impl ProjectTimeStatistics {
    /// `current_session` maps a task id to its active timer's elapsed
    /// minutes; `is_running` reports whether that timer is running.
    pub fn compute<E, R>(
        project_id: &str,
        tasks: &[Task],
        entries: &[TimeEntry],
        current_session: E,
        is_running: R,
    ) -> Self
    where
        E: Fn(&str) -> i64,
        R: Fn(&str) -> bool,
    {
        let recorded: i64 = entries.iter().map(|e| e.duration).sum();
        let live: i64 = tasks.iter().map(|t| current_session(&t.id)).sum();
        let total_time = recorded + live;
        let estimated_time = tasks
            .iter()
            .filter_map(|t| t.estimated_duration)
            .fold(0i64, i64::saturating_add);
        Self {
            project_id: project_id.to_string(),
            total_time,
            estimated_time,
            remaining_time: (estimated_time - total_time).max(0),
            is_overtime: total_time > estimated_time,
            tasks_count: tasks.len(),
            completed_tasks_count: tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Completed)
                .count(),
            active_timers_count: tasks.iter().filter(|t| is_running(&t.id)).count(),
        }
    }
}
