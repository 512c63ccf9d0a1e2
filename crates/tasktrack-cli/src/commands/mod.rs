pub mod config;
pub mod notify;
pub mod project;
pub mod settings;
pub mod task;
pub mod timer;

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tasktrack_core::{Config, TaskManager};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Open the manager, recover persisted timers, run `f`, then flush.
///
/// Every invocation is a short-lived process, so timers keep running
/// between commands through their persisted snapshots.
pub fn with_manager<F, Fut>(config: Config, f: F) -> CmdResult
where
    F: FnOnce(Arc<TaskManager>) -> Fut,
    Fut: Future<Output = CmdResult>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let manager = Arc::new(TaskManager::open(config)?);
        let timers = manager.recover().await?;
        tracing::debug!(timers, "manager ready");
        let result = f(manager.clone()).await;
        if let Err(e) = &result {
            tracing::debug!(error = %e, "command failed, flushing timers anyway");
        }
        manager.shutdown().await?;
        result
    })
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Clap value parser for RFC 3339 timestamps.
pub fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected RFC 3339 time (e.g. 2024-05-01T09:00:00Z): {e}"))
}
