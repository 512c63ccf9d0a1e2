//! Typed events and the publish/subscribe bus.
//!
//! Every timer state change produces an [`Event`]. Listeners are invoked
//! synchronously, in subscription order, from inside the task's critical
//! section, so events for one task arrive in the order they happened.
//! A failing or panicking listener is logged and skipped.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notification::NotificationKind;
use crate::timer::{ActiveTimer, TimeEntry};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStarted {
        task_id: String,
        project_id: Option<String>,
        at: DateTime<Utc>,
    },
    /// `entry` is `None` for an instantaneous implicit stop (restart).
    TimerStopped {
        task_id: String,
        entry: Option<TimeEntry>,
        elapsed_minutes: i64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        task_id: String,
        elapsed_minutes: i64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        task_id: String,
        at: DateTime<Utc>,
    },
    /// Elapsed time crossed the task's estimate.
    TimerUp {
        task_id: String,
        elapsed_minutes: i64,
        estimated_minutes: i64,
        at: DateTime<Utc>,
    },
    /// Emitted after each reconciliation pass.
    TimersUpdated {
        timers: Vec<ActiveTimer>,
        at: DateTime<Utc>,
    },
    NotificationTapped {
        notification_id: Option<String>,
        kind: Option<NotificationKind>,
        task_id: Option<String>,
        project_id: Option<String>,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Event::TimerStarted { task_id, .. }
            | Event::TimerStopped { task_id, .. }
            | Event::TimerPaused { task_id, .. }
            | Event::TimerResumed { task_id, .. }
            | Event::TimerUp { task_id, .. } => Some(task_id),
            Event::NotificationTapped { task_id, .. } => task_id.as_deref(),
            Event::TimersUpdated { .. } => None,
        }
    }
}

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives published events.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event) -> Result<(), ListenerError>;
}

impl<F> EventListener for F
where
    F: Fn(&Event) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_event(&self, event: &Event) -> Result<(), ListenerError> {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<BTreeMap<SubscriptionId, Arc<dyn EventListener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl EventListener + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id, Arc::new(listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id)
            .is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Deliver `event` to every listener. Returns how many accepted it.
    pub fn publish(&self, event: &Event) -> usize {
        // Snapshot so listeners may (un)subscribe without deadlocking.
        let listeners: Vec<(SubscriptionId, Arc<dyn EventListener>)> = self
            .listeners
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(id, l)| (*id, l.clone()))
            .collect();

        let mut delivered = 0;
        for (id, listener) in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(subscription = id.0, error = %e, "event listener failed");
                }
                Err(_) => {
                    tracing::error!(subscription = id.0, "event listener panicked");
                }
            }
        }
        delivered
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
