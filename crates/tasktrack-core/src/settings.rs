//! User settings persisted in the store's key-value table.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::storage::config::{json_path_get, json_path_set};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub sound_enabled: bool,
    #[serde(default = "default_true")]
    pub vibration_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkingHours {
    /// "HH:MM"
    #[serde(default = "default_work_start")]
    pub start: String,
    /// "HH:MM"
    #[serde(default = "default_work_end")]
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub working_hours: WorkingHours,
    /// Minutes.
    #[serde(default = "default_task_duration")]
    pub default_task_duration: i64,
    #[serde(default)]
    pub auto_start_timer: bool,
}

fn default_true() -> bool {
    true
}
fn default_work_start() -> String {
    "09:00".into()
}
fn default_work_end() -> String {
    "17:00".into()
}
fn default_task_duration() -> i64 {
    60
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sound_enabled: true,
            vibration_enabled: true,
        }
    }
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start: default_work_start(),
            end: default_work_end(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            notifications: NotificationSettings::default(),
            working_hours: WorkingHours::default(),
            default_task_duration: default_task_duration(),
            auto_start_timer: false,
        }
    }
}

impl Settings {
    /// Read one setting by dot-separated key, e.g. `working_hours.start`.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        match json_path_get(&json, key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Return a copy with one setting replaced. Range checks happen when
    /// the manager persists the result.
    pub fn with(&self, key: &str, value: &str) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(self).map_err(|e| invalid(e.to_string()))?;
        json_path_set(&mut json, key, value)?;
        serde_json::from_value(json).map_err(|e| invalid(e.to_string()))
    }
}
