//! Structured Logger
//!
//! Wraps `tracing` with environment-based level control, a console layer
//! and an optional rolling NDJSON file layer.

use std::path::PathBuf;

use plugbus_config::LoggingConfig;
use plugbus_config::defaults::DEFAULT_LOG_LEVEL;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "plugbus.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub level: String,
    pub dir: Option<PathBuf>,
    pub json: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self { level: DEFAULT_LOG_LEVEL.to_string(), dir: None, json: false }
    }
}

impl LogOptions {
    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.clone().unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            dir: config.dir.as_ref().map(PathBuf::from),
            json: config.json.unwrap_or(false),
        }
    }
}

/// Initialize the global subscriber. `RUST_LOG` overrides `options.level`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_logger(options: &LogOptions) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&options.level));

    let console_plain = (!options.json).then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(false)
            .with_ansi(true)
    });
    let console_json = options
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stdout));

    // Rolling file appender: writes NDJSON to `<dir>/plugbus.log.YYYY-MM-DD`
    let file_layer = options.dir.as_ref().map(|dir| {
        fmt::layer()
            .json()
            .with_writer(RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX))
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_plain)
        .with(console_json)
        .with(file_layer)
        .try_init()
        .is_ok()
}
