//! # Tasktrack Core Library
//!
//! Core logic for tasktrack: per-task time tracking, notification
//! scheduling and project analytics. The CLI is a thin layer over the same
//! library.
//!
//! ## Architecture
//!
//! - **Timer Engine**: wall-clock based per-task timers; the caller invokes
//!   `tick()` periodically to reconcile running timers
//! - **Notification Scheduler**: persisted reminders derived from task and
//!   project dates, delivered through a pluggable platform notifier
//! - **Storage**: SQLite store behind an async `Store` trait, TOML config
//! - **Analytics**: pure functions over projects, tasks and time entries
//!
//! ## Key Components
//!
//! - [`TaskManager`]: context object wiring everything together
//! - [`TimerEngine`]: timer state machines and accounting
//! - [`NotificationScheduler`]: reminder lifecycle
//! - [`SqliteStore`]: persistence
//! - [`Config`]: application configuration

pub mod clock;
pub mod error;
pub mod events;
pub mod manager;
pub mod notification;
pub mod project;
pub mod settings;
pub mod stats;
pub mod storage;
pub mod task;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, DatabaseError, NotifierError, Result, ValidationError};
pub use events::{Event, EventBus};
pub use manager::{ExportFormat, ProjectBundle, ProjectExport, TaskManager};
pub use notification::{
    LogNotifier, NotificationKind, NotificationScheduler, PlatformNotifier, RecordingNotifier,
    ScheduledNotification,
};
pub use project::{NewProject, Project, ProjectPatch, ProjectStatus};
pub use settings::Settings;
pub use stats::{ProjectAnalytics, ProjectTimeStatistics, TaskTimeStatistics};
pub use storage::{Config, SqliteStore, Store};
pub use task::{
    NewTask, Task, TaskFilter, TaskPatch, TaskPriority, TaskStatus, MAX_ESTIMATED_DURATION,
};
pub use timer::{ActiveTimer, StopOutcome, TickReport, TimeEntry, TimerEngine};
