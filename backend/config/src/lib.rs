//! `plugbus-config`: configuration for the plugin fabric.
//!
//! Provides:
//! - `Configuration`, the flat property snapshot plugins receive
//! - `EngineConfig`, the typed YAML schema the engine starts from
//! - `${ENV_VAR}` substitution
//! - Default value application and validation

pub mod defaults;
pub mod env;
pub mod io;
pub mod properties;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::load_config;
pub use properties::{split_list, ConfigError, Configuration, PropertyEntry, LIST_DELIMITER};
pub use schema::{
    EngineConfig, LoggingConfig, PluginsConfig, WindowConfig, DAG_SETUP_PLUGINS_KEY,
    EXECUTION_PLUGINS_KEY, FIRST_WINDOW_KEY, WINDOW_WIDTH_KEY,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;

/// Load, substitute env vars, apply defaults and validate a config file.
///
/// This is the main entry point for loading a config at engine startup.
pub async fn load_and_prepare(path: &Path) -> Result<EngineConfig> {
    prepare_with(load_config(path).await?, &std::env::vars().collect())
}

/// The pure half of [`load_and_prepare`], with an explicit environment.
pub fn prepare_with(raw_config: EngineConfig, env: &HashMap<String, String>) -> Result<EngineConfig> {
    let value: Value =
        serde_json::to_value(&raw_config).context("Failed to serialize config for processing")?;
    let value = resolve_env_vars_with(&value, env).context("Failed to resolve env vars in config")?;
    let config: EngineConfig =
        serde_json::from_value(value).context("Failed to deserialize config after processing")?;

    let config = apply_all_defaults(config);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if let Some(first) = report.errors.into_iter().next() {
        bail!(first);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_substitutes_plugin_ids() {
        let cfg: EngineConfig =
            serde_yaml::from_str("plugins:\n  execution: [\"${TAP}\"]\n").unwrap();
        let env = HashMap::from([("TAP".to_string(), "heartbeat-monitor".to_string())]);
        let cfg = prepare_with(cfg, &env).unwrap();
        assert_eq!(cfg.execution_plugins(), ["heartbeat-monitor"]);
        assert!(cfg.logging.is_some());
    }

    #[test]
    fn prepare_fails_on_validation_error() {
        let cfg: EngineConfig = serde_yaml::from_str("window:\n  widthMillis: 0\n").unwrap();
        let err = prepare_with(cfg, &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("window.widthMillis"));
    }

    #[tokio::test]
    async fn load_and_prepare_reads_file() {
        let path = std::env::temp_dir().join(format!("plugbus-{}.yaml", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, "plugins:\n  dagSetup: [audit]\n").await.unwrap();
        let cfg = load_and_prepare(&path).await.unwrap();
        assert_eq!(cfg.dag_setup_plugins(), ["audit"]);
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
