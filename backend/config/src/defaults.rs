//! Config defaults: fills in values the operator left out.

use crate::schema::{EngineConfig, LoggingConfig, PluginsConfig, WindowConfig};

pub use plugbus_core::DEFAULT_WINDOW_WIDTH_MILLIS;

pub const DEFAULT_FIRST_WINDOW_MILLIS: i64 = 0;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: EngineConfig) -> EngineConfig {
    let config = apply_plugin_defaults(config);
    let config = apply_window_defaults(config);
    apply_logging_defaults(config)
}

fn apply_plugin_defaults(mut config: EngineConfig) -> EngineConfig {
    config.plugins.get_or_insert_with(PluginsConfig::default);
    config
}

fn apply_window_defaults(mut config: EngineConfig) -> EngineConfig {
    let window = config.window.get_or_insert_with(WindowConfig::default);
    if window.width_millis.is_none() {
        window.width_millis = Some(DEFAULT_WINDOW_WIDTH_MILLIS);
    }
    if window.first_window_millis.is_none() {
        window.first_window_millis = Some(DEFAULT_FIRST_WINDOW_MILLIS);
    }
    config
}

fn apply_logging_defaults(mut config: EngineConfig) -> EngineConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    if logging.level.is_none() {
        logging.level = Some(DEFAULT_LOG_LEVEL.to_string());
    }
    if logging.json.is_none() {
        logging.json = Some(false);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_window_and_logging() {
        let cfg = apply_all_defaults(EngineConfig::default());
        let window = cfg.window.unwrap();
        assert_eq!(window.width_millis, Some(DEFAULT_WINDOW_WIDTH_MILLIS));
        assert_eq!(cfg.logging.unwrap().level.as_deref(), Some(DEFAULT_LOG_LEVEL));
        assert!(cfg.plugins.is_some());
    }

    #[test]
    fn keeps_operator_values() {
        let mut cfg = EngineConfig::default();
        cfg.window = Some(WindowConfig { width_millis: Some(100), first_window_millis: None });
        let cfg = apply_all_defaults(cfg);
        assert_eq!(cfg.window.unwrap().width_millis, Some(100));
    }
}
