//! Contained plugin failures, written as structured records on a
//! dedicated target so they can be routed separately from engine logs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

pub const PLUGIN_EVENTS_TARGET: &str = "plugin_events";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePhase {
    Dispatch,
    Teardown,
}

#[derive(Debug, Clone, Serialize)]
pub struct PluginFailureRecord {
    pub phase: FailurePhase,
    pub plugin: String,
    pub plugin_id: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    pub error: String,
    pub panicked: bool,
    pub timestamp: DateTime<Utc>,
}

impl PluginFailureRecord {
    pub fn dispatch(
        plugin: impl Into<String>,
        plugin_id: usize,
        event_type: impl ToString,
        error: impl Into<String>,
        panicked: bool,
    ) -> Self {
        Self {
            phase: FailurePhase::Dispatch,
            plugin: plugin.into(),
            plugin_id,
            event_type: Some(event_type.to_string()),
            error: error.into(),
            panicked,
            timestamp: Utc::now(),
        }
    }

    pub fn teardown(plugin: impl Into<String>, plugin_id: usize, error: impl Into<String>, panicked: bool) -> Self {
        Self {
            phase: FailurePhase::Teardown,
            plugin: plugin.into(),
            plugin_id,
            event_type: None,
            error: error.into(),
            panicked,
            timestamp: Utc::now(),
        }
    }

    pub fn emit(&self) {
        let record = serde_json::to_string(self).unwrap_or_default();
        warn!(
            target: PLUGIN_EVENTS_TARGET,
            plugin = %self.plugin,
            plugin_id = self.plugin_id,
            event_type = self.event_type.as_deref().unwrap_or("-"),
            panicked = self.panicked,
            error = %self.error,
            record = %record,
            "Plugin failure contained"
        );
    }
}
