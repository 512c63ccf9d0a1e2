use std::sync::Arc;

use clap::Subcommand;
use serde::Serialize;
use tasktrack_core::{ActiveTimer, Config, TaskManager};

use super::{print_json, with_manager, CmdResult};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start (or restart) the timer for a task
    Start {
        /// Task ID
        task_id: String,
    },
    /// Stop a task's timer and record the session
    Stop {
        /// Task ID
        task_id: String,
    },
    /// Pause a running timer
    Pause {
        /// Task ID
        task_id: String,
    },
    /// Resume a paused timer
    Resume {
        /// Task ID
        task_id: String,
    },
    /// Stop every active timer
    StopAll,
    /// Print active timers as JSON
    Status {
        /// Only this task's timer
        task_id: Option<String>,
    },
    /// Reconcile running timers once
    Tick,
    /// Time statistics for a task
    Stats {
        /// Task ID
        task_id: String,
    },
}

#[derive(Serialize)]
struct TimerStatus {
    #[serde(flatten)]
    timer: ActiveTimer,
    current_elapsed: i64,
}

pub fn run(action: TimerAction, config: Config) -> CmdResult {
    with_manager(config, |manager| dispatch(action, manager))
}

async fn dispatch(action: TimerAction, manager: Arc<TaskManager>) -> CmdResult {
    match action {
        TimerAction::Start { task_id } => {
            print_json(&manager.start_timer(&task_id).await?)?;
        }
        TimerAction::Stop { task_id } => {
            print_json(&manager.stop_timer(&task_id).await?)?;
        }
        TimerAction::Pause { task_id } => {
            print_json(&manager.pause_timer(&task_id).await?)?;
        }
        TimerAction::Resume { task_id } => {
            print_json(&manager.resume_timer(&task_id).await?)?;
        }
        TimerAction::StopAll => {
            print_json(&manager.engine().stop_all().await?)?;
        }
        TimerAction::Status { task_id } => {
            let engine = manager.engine();
            let status: Vec<TimerStatus> = engine
                .active_timers()
                .into_iter()
                .filter(|t| task_id.as_deref().map_or(true, |id| t.task_id == id))
                .map(|timer| TimerStatus {
                    current_elapsed: engine.current_elapsed_minutes(&timer.task_id),
                    timer,
                })
                .collect();
            print_json(&status)?;
        }
        TimerAction::Tick => {
            print_json(&manager.tick().await?)?;
        }
        TimerAction::Stats { task_id } => {
            print_json(&manager.task_time_statistics(&task_id).await?)?;
        }
    }
    Ok(())
}
