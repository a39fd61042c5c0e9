//! Monitor settings and partial updates.

use crate::store::DEFAULT_MAX_TRACES;
use crate::MonitorError;
use serde::{Deserialize, Serialize};

/// Configuration for the trace monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSettings {
    /// Maximum traces kept in history.
    #[serde(default = "default_max_traces")]
    pub max_traces: usize,
    /// Follow the newest trace while the panel is open.
    #[serde(default = "default_true")]
    pub auto_scroll: bool,
    /// Insert incoming traces. When off, the connection stays up but
    /// traces are dropped.
    #[serde(default = "default_true")]
    pub live_updates_enabled: bool,
}

fn default_max_traces() -> usize {
    DEFAULT_MAX_TRACES
}

fn default_true() -> bool {
    true
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            max_traces: DEFAULT_MAX_TRACES,
            auto_scroll: true,
            live_updates_enabled: true,
        }
    }
}

impl MonitorSettings {
    pub fn with_max_traces(mut self, max_traces: usize) -> Self {
        self.max_traces = max_traces;
        self
    }

    pub fn with_auto_scroll(mut self, enabled: bool) -> Self {
        self.auto_scroll = enabled;
        self
    }

    pub fn with_live_updates(mut self, enabled: bool) -> Self {
        self.live_updates_enabled = enabled;
        self
    }

    /// Merges the supplied fields. Nothing changes if the update is invalid.
    pub fn apply(&mut self, update: &SettingsUpdate) -> Result<(), MonitorError> {
        if update.max_traces == Some(0) {
            return Err(MonitorError::InvalidSetting(
                "maxTraces must be at least 1".to_string(),
            ));
        }

        if let Some(max) = update.max_traces {
            self.max_traces = max;
        }
        if let Some(auto_scroll) = update.auto_scroll {
            self.auto_scroll = auto_scroll;
        }
        if let Some(live) = update.live_updates_enabled {
            self.live_updates_enabled = live;
        }
        Ok(())
    }
}

/// Partial settings update; only supplied fields change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    #[serde(default)]
    pub max_traces: Option<usize>,
    #[serde(default)]
    pub auto_scroll: Option<bool>,
    #[serde(default)]
    pub live_updates_enabled: Option<bool>,
}

impl SettingsUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_traces(mut self, max_traces: usize) -> Self {
        self.max_traces = Some(max_traces);
        self
    }

    pub fn auto_scroll(mut self, enabled: bool) -> Self {
        self.auto_scroll = Some(enabled);
        self
    }

    pub fn live_updates(mut self, enabled: bool) -> Self {
        self.live_updates_enabled = Some(enabled);
        self
    }
}
