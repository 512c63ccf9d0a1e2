use std::sync::Arc;

use clap::Subcommand;
use tasktrack_core::{Config, TaskManager};

use super::{print_json, with_manager, CmdResult};

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print the stored settings
    Show,
    /// Get one setting
    Get {
        /// Setting key (e.g. "working_hours.start")
        key: String,
    },
    /// Change one setting
    Set {
        /// Setting key (e.g. "notifications.sound_enabled")
        key: String,
        /// New value
        value: String,
    },
}

pub fn run(action: SettingsAction, config: Config) -> CmdResult {
    with_manager(config, |manager| dispatch(action, manager))
}

async fn dispatch(action: SettingsAction, manager: Arc<TaskManager>) -> CmdResult {
    match action {
        SettingsAction::Show => {
            print_json(&manager.settings().await?)?;
        }
        SettingsAction::Get { key } => {
            let settings = manager.settings().await?;
            match settings.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        SettingsAction::Set { key, value } => {
            let updated = manager.settings().await?.with(&key, &value)?;
            print_json(&manager.update_settings(updated).await?)?;
        }
    }
    Ok(())
}
