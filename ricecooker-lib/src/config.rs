use crate::error::{Error, Result};
use crate::retry::{Backoff, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Storage key holding the whole selector -> override map.
pub const DEFAULT_STORAGE_KEY: &str = "elementStyles";

pub const DEFAULT_FAILURE_ALERT: &str = "Please refresh the page and try again.";

/// Tunables shared by every surface. Every field has a default, so a config
/// file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage_key: String,
    pub panel_retry: PanelRetrySettings,
    /// Interval between Coordinator initialization attempts.
    pub coordinator_retry_ms: u64,
    pub highlight: HighlightSettings,
    pub failure_alert: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelRetrySettings {
    pub max_attempts: u32,
    /// Delay after failed attempt `k` is `k * step_ms`.
    pub step_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightSettings {
    pub hover_outline: String,
    pub hover_outline_offset: String,
    pub selected_outline: String,
    pub edited_outline: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            panel_retry: PanelRetrySettings::default(),
            coordinator_retry_ms: 1000,
            highlight: HighlightSettings::default(),
            failure_alert: DEFAULT_FAILURE_ALERT.to_string(),
        }
    }
}

impl Default for PanelRetrySettings {
    fn default() -> Self {
        PanelRetrySettings {
            max_attempts: 3,
            step_ms: 1000,
        }
    }
}

impl Default for HighlightSettings {
    fn default() -> Self {
        HighlightSettings {
            hover_outline: "2px solid #ff0000".to_string(),
            hover_outline_offset: "-2px".to_string(),
            selected_outline: "2px solid #00ff00".to_string(),
            edited_outline: "2px solid #00ff00".to_string(),
        }
    }
}

impl Settings {
    /// Read settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        if settings.storage_key.is_empty() {
            return Err(Error::Config("storage_key must not be empty".to_string()));
        }
        Ok(settings)
    }

    pub fn panel_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::bounded(
            self.panel_retry.max_attempts,
            Backoff::Linear(Duration::from_millis(self.panel_retry.step_ms)),
        )
    }

    pub fn coordinator_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::unbounded(Backoff::Fixed(Duration::from_millis(
            self.coordinator_retry_ms,
        )))
    }
}
