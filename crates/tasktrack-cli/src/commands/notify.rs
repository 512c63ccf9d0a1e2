use std::sync::Arc;

use clap::Subcommand;
use tasktrack_core::{Config, TaskManager};

use super::{print_json, with_manager, CmdResult};

#[derive(Subcommand)]
pub enum NotifyAction {
    /// List pending notifications
    List,
    /// Fire overdue alerts for tasks past their due date
    Check,
    /// Schedule tomorrow's summary reminder
    Daily,
    /// Cancel a pending notification
    Cancel {
        /// Notification ID
        id: String,
    },
}

pub fn run(action: NotifyAction, config: Config) -> CmdResult {
    with_manager(config, |manager| dispatch(action, manager))
}

async fn dispatch(action: NotifyAction, manager: Arc<TaskManager>) -> CmdResult {
    match action {
        NotifyAction::List => {
            print_json(&manager.pending_notifications().await?)?;
        }
        NotifyAction::Check => {
            let fired = manager.check_due_tasks().await?;
            print_json(&serde_json::json!({ "fired": fired }))?;
        }
        NotifyAction::Daily => {
            print_json(&manager.schedule_daily_reminder().await?)?;
        }
        NotifyAction::Cancel { id } => {
            if !manager.scheduler().cancel(&id).await? {
                return Err(format!("no pending notification {id}").into());
            }
            print_json(&serde_json::json!({ "cancelled": id }))?;
        }
    }
    Ok(())
}
