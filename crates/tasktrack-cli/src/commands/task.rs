use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Subcommand;
use tasktrack_core::{
    Config, NewTask, TaskFilter, TaskManager, TaskPatch, TaskPriority, TaskStatus,
};

use super::{parse_time, print_json, with_manager, CmdResult};

fn parse_status(s: &str) -> Result<TaskStatus, String> {
    TaskStatus::parse(s).ok_or_else(|| {
        format!("unknown status '{s}' (pending, in_progress, completed, cancelled, overdue)")
    })
}

fn parse_priority(s: &str) -> Result<TaskPriority, String> {
    TaskPriority::parse(s)
        .ok_or_else(|| format!("unknown priority '{s}' (low, medium, high, urgent)"))
}

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a new task
    Create {
        /// Task title
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Owning project ID
        #[arg(long)]
        project: Option<String>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<TaskPriority>,
        /// Estimated duration in minutes
        #[arg(long)]
        estimate: Option<i64>,
        /// Planned start (RFC 3339)
        #[arg(long, value_parser = parse_time)]
        start: Option<DateTime<Utc>>,
        /// Due date (RFC 3339)
        #[arg(long, value_parser = parse_time)]
        due: Option<DateTime<Utc>>,
        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// List tasks
    List {
        #[arg(long)]
        project: Option<String>,
        #[arg(long, value_parser = parse_status)]
        status: Option<TaskStatus>,
        /// Only tasks with a running timer
        #[arg(long)]
        running: bool,
    },
    /// Show a task
    Get {
        /// Task ID
        id: String,
    },
    /// Update a task
    Update {
        /// Task ID
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = parse_status)]
        status: Option<TaskStatus>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<TaskPriority>,
        /// Move to another project
        #[arg(long, conflicts_with = "no_project")]
        project: Option<String>,
        /// Detach from its project
        #[arg(long)]
        no_project: bool,
        #[arg(long)]
        estimate: Option<i64>,
        #[arg(long, value_parser = parse_time, conflicts_with = "clear_start")]
        start: Option<DateTime<Utc>>,
        #[arg(long)]
        clear_start: bool,
        #[arg(long, value_parser = parse_time, conflicts_with = "clear_due")]
        due: Option<DateTime<Utc>>,
        #[arg(long)]
        clear_due: bool,
    },
    /// Mark a task completed (stops its timer)
    Complete {
        /// Task ID
        id: String,
    },
    /// Delete a task and its time entries
    Delete {
        /// Task ID
        id: String,
    },
}

/// `Some(Some(v))` to set, `Some(None)` to clear, `None` to leave as is.
fn set_or_clear<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

pub fn run(action: TaskAction, config: Config) -> CmdResult {
    with_manager(config, |manager| dispatch(action, manager))
}

async fn dispatch(action: TaskAction, manager: Arc<TaskManager>) -> CmdResult {
    match action {
        TaskAction::Create {
            title,
            description,
            project,
            priority,
            estimate,
            start,
            due,
            tags,
        } => {
            let task = manager
                .create_task(NewTask {
                    title,
                    description,
                    status: TaskStatus::Pending,
                    priority: priority.unwrap_or_default(),
                    project_id: project,
                    start_time: start,
                    due_date: due,
                    estimated_duration: estimate,
                    tags,
                })
                .await?;
            print_json(&task)?;
        }
        TaskAction::List {
            project,
            status,
            running,
        } => {
            let filter = TaskFilter {
                project_id: project,
                status,
                timer_running: running.then_some(true),
            };
            print_json(&manager.list_tasks(&filter).await?)?;
        }
        TaskAction::Get { id } => {
            print_json(&manager.get_task(&id).await?)?;
        }
        TaskAction::Update {
            id,
            title,
            description,
            status,
            priority,
            project,
            no_project,
            estimate,
            start,
            clear_start,
            due,
            clear_due,
        } => {
            let patch = TaskPatch {
                title,
                description,
                status,
                priority,
                project_id: set_or_clear(project, no_project),
                start_time: set_or_clear(start, clear_start),
                due_date: set_or_clear(due, clear_due),
                estimated_duration: estimate.map(Some),
                ..TaskPatch::default()
            };
            if patch.is_empty() {
                return Err("nothing to update".into());
            }
            print_json(&manager.update_task(&id, patch).await?)?;
        }
        TaskAction::Complete { id } => {
            print_json(&manager.complete_task(&id).await?)?;
        }
        TaskAction::Delete { id } => {
            manager.delete_task(&id).await?;
            print_json(&serde_json::json!({ "deleted": id }))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_or_clear_prefers_clear() {
        assert_eq!(set_or_clear(Some(3), true), Some(None));
        assert_eq!(set_or_clear(Some(3), false), Some(Some(3)));
        assert_eq!(set_or_clear::<i32>(None, false), None);
    }
}
