//! Typed engine configuration, deserialised from YAML.

use std::collections::BTreeMap;

use plugbus_core::WindowClock;
use serde::{Deserialize, Serialize};

use crate::defaults::{DEFAULT_FIRST_WINDOW_MILLIS, DEFAULT_WINDOW_WIDTH_MILLIS};
use crate::properties::{ConfigError, Configuration, LIST_DELIMITER};

/// Ordered list of DAG setup plugin identifiers.
pub const DAG_SETUP_PLUGINS_KEY: &str = "plugbus.plugin.dag.setup";
/// Ordered list of execution plugin identifiers.
pub const EXECUTION_PLUGINS_KEY: &str = "plugbus.plugin.dag.execution";
pub const WINDOW_WIDTH_KEY: &str = "plugbus.window.width.millis";
pub const FIRST_WINDOW_KEY: &str = "plugbus.window.first.millis";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Plugin identifiers, per domain, in resolution order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<PluginsConfig>,

    /// Streaming window geometry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    /// Free-form properties copied into the plugin configuration snapshot
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginsConfig {
    #[serde(default)]
    pub dag_setup: Vec<String>,
    #[serde(default)]
    pub execution: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width_millis: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_window_millis: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Directory for the rolling NDJSON log; console only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,
}

impl EngineConfig {
    pub fn dag_setup_plugins(&self) -> &[String] {
        self.plugins.as_ref().map(|p| p.dag_setup.as_slice()).unwrap_or_default()
    }

    pub fn execution_plugins(&self) -> &[String] {
        self.plugins.as_ref().map(|p| p.execution.as_slice()).unwrap_or_default()
    }

    pub fn window_clock(&self) -> WindowClock {
        let window = self.window.clone().unwrap_or_default();
        WindowClock::new(
            window.first_window_millis.unwrap_or(DEFAULT_FIRST_WINDOW_MILLIS),
            window.width_millis.unwrap_or(DEFAULT_WINDOW_WIDTH_MILLIS),
        )
    }

    /// Flatten into the property snapshot plugins receive. Free-form
    /// properties go in first; the well-known keys are written final on top.
    pub fn to_configuration(&self) -> Result<Configuration, ConfigError> {
        let mut conf = Configuration::new();
        for (key, value) in &self.properties {
            conf.set(key.clone(), value.clone())?;
        }

        let delimiter = LIST_DELIMITER.to_string();
        conf.set_final(DAG_SETUP_PLUGINS_KEY, self.dag_setup_plugins().join(&delimiter))?;
        conf.set_final(EXECUTION_PLUGINS_KEY, self.execution_plugins().join(&delimiter))?;

        let clock = self.window_clock();
        conf.set_final(WINDOW_WIDTH_KEY, clock.window_width_millis.to_string())?;
        conf.set_final(FIRST_WINDOW_KEY, clock.first_window_millis.to_string())?;
        Ok(conf)
    }
}
