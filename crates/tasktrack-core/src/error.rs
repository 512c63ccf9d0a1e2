//! Core error types for tasktrack-core.
//!
//! This module defines the error hierarchy using thiserror. Timer commands
//! report expected no-op conditions (stopping a timer that is not active,
//! resuming one that is not paused) as `CoreError::InvalidState` values, while
//! unresolved ids surface as `CoreError::NotFound`.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Kind of entity an id failed to resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Task,
    Project,
    Notification,
    Template,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Task => "Task",
            EntityKind::Project => "Project",
            EntityKind::Notification => "Notification",
            EntityKind::Template => "Template",
        };
        f.write_str(name)
    }
}

/// Core error type for tasktrack-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A task/project/notification id did not resolve.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// The requested transition does not apply to the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A notification target instant is not in the future.
    #[error("Cannot schedule notification '{id}' at {scheduled_time}: not after {now}")]
    PastTime {
        id: String,
        scheduled_time: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Store read/write failures
    #[error("Persistence error: {0}")]
    Persistence(#[from] DatabaseError),

    /// Platform notifier failures
    #[error("Notifier error: {0}")]
    Notifier(#[from] NotifierError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn task_not_found(id: &str) -> Self {
        CoreError::NotFound {
            kind: EntityKind::Task,
            id: id.to_string(),
        }
    }

    pub fn project_not_found(id: &str) -> Self {
        CoreError::NotFound {
            kind: EntityKind::Project,
            id: id.to_string(),
        }
    }

    /// True for the expected no-op outcomes of timer commands.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, CoreError::InvalidState(_))
    }

    /// True when the error came from the persistent store.
    pub fn is_persistence(&self) -> bool {
        matches!(self, CoreError::Persistence(_))
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be decoded
    #[error("Corrupt {table} row '{id}': {message}")]
    Corrupt {
        table: &'static str,
        id: String,
        message: String,
    },

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// The store is unavailable (used by wrappers and test doubles)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Platform notifier errors. Always advisory: logged, never fatal.
#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Failed to schedule '{id}': {message}")]
    ScheduleFailed { id: String, message: String },

    #[error("Failed to cancel '{id}': {message}")]
    CancelFailed { id: String, message: String },

    #[error("Notifier unavailable: {0}")]
    Unavailable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be determined or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid time range
    #[error("Invalid time range: end ({end}) must not be before start ({start})")]
    InvalidTimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl ValidationError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Persistence(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
