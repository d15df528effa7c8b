//! Config validation with field paths in every message.

use std::collections::HashSet;

use thiserror::Error;

use crate::properties::LIST_DELIMITER;
use crate::schema::EngineConfig;

#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError { path: path.into(), message: message.into() });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError { path: path.into(), message: message.into() });
    }
}

pub fn validate(config: &EngineConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_plugin_ids("plugins.dagSetup", config.dag_setup_plugins(), &mut report);
    validate_plugin_ids("plugins.execution", config.execution_plugins(), &mut report);
    validate_window(config, &mut report);
    report
}

fn validate_plugin_ids(path: &str, ids: &[String], report: &mut ValidationReport) {
    let mut seen = HashSet::new();
    for (i, id) in ids.iter().enumerate() {
        let item = format!("{path}[{i}]");
        if id.trim().is_empty() {
            report.error(&item, "Plugin identifier cannot be empty");
            continue;
        }
        if id.contains(LIST_DELIMITER) {
            report.error(&item, format!("Plugin identifier cannot contain '{LIST_DELIMITER}'"));
        }
        if !seen.insert(id.trim()) {
            report.warn(&item, format!("Plugin '{id}' is listed more than once; each entry is a separate instance"));
        }
    }
}

fn validate_window(config: &EngineConfig, report: &mut ValidationReport) {
    let Some(window) = &config.window else { return };
    if window.width_millis == Some(0) {
        report.error("window.widthMillis", "Window width must be greater than zero");
    }
    if window.first_window_millis.is_some_and(|ms| ms < 0) {
        report.error("window.firstWindowMillis", "First window time cannot be negative");
    }
}
