//! Outbound interface to the platform's notification system.
//!
//! Transport details (channels, permissions, sounds) live behind
//! [`PlatformNotifier`]. Every call is advisory: the scheduler logs failures
//! and keeps going.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RepeatInterval, ScheduledNotification};
use crate::error::NotifierError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformNotification {
    pub id: String,
    pub title: String,
    pub body: String,
    pub fire_at: DateTime<Utc>,
    pub repeat: Option<RepeatInterval>,
}

impl From<&ScheduledNotification> for PlatformNotification {
    fn from(n: &ScheduledNotification) -> Self {
        Self {
            id: n.id.clone(),
            title: n.title.clone(),
            body: n.message.clone(),
            fire_at: n.scheduled_time,
            repeat: n.repeat(),
        }
    }
}

#[async_trait]
pub trait PlatformNotifier: Send + Sync {
    async fn schedule(&self, notification: &PlatformNotification) -> Result<(), NotifierError>;
    async fn cancel(&self, id: &str) -> Result<(), NotifierError>;
    async fn cancel_all(&self) -> Result<(), NotifierError>;
}

/// Writes notifications to the log. Used by the CLI, which has no native
/// notification transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl PlatformNotifier for LogNotifier {
    async fn schedule(&self, n: &PlatformNotification) -> Result<(), NotifierError> {
        tracing::info!(
            id = %n.id,
            fire_at = %n.fire_at.to_rfc3339(),
            repeat = ?n.repeat,
            "notification: {} - {}",
            n.title,
            n.body
        );
        Ok(())
    }

    async fn cancel(&self, id: &str) -> Result<(), NotifierError> {
        tracing::debug!(id, "notification cancelled");
        Ok(())
    }

    async fn cancel_all(&self) -> Result<(), NotifierError> {
        tracing::debug!("all notifications cancelled");
        Ok(())
    }
}

/// Call recorded by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub enum NotifierCall {
    Schedule(PlatformNotification),
    Cancel(String),
    CancelAll,
}

/// In-memory notifier that records every call. Can be switched to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<NotifierCall>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (calls are still recorded).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|p| p.into_inner()) = failing;
    }

    pub fn calls(&self) -> Vec<NotifierCall> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn scheduled(&self) -> Vec<PlatformNotification> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                NotifierCall::Schedule(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                NotifierCall::Cancel(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: NotifierCall) -> Result<(), NotifierError> {
        let id = match &call {
            NotifierCall::Schedule(n) => n.id.clone(),
            NotifierCall::Cancel(id) => id.clone(),
            NotifierCall::CancelAll => "*".to_string(),
        };
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(call);
        if *self.failing.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(NotifierError::Unavailable(format!("recording notifier failing ({id})")));
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformNotifier for RecordingNotifier {
    async fn schedule(&self, notification: &PlatformNotification) -> Result<(), NotifierError> {
        self.record(NotifierCall::Schedule(notification.clone()))
    }

    async fn cancel(&self, id: &str) -> Result<(), NotifierError> {
        self.record(NotifierCall::Cancel(id.to_string()))
    }

    async fn cancel_all(&self) -> Result<(), NotifierError> {
        self.record(NotifierCall::CancelAll)
    }
}
