//! Structured logging for the plugin fabric.
//!
//! Console output plus an optional daily-rolling NDJSON file, and the
//! record type used to report contained plugin failures.

pub mod failure_log;
pub mod logger;

pub use failure_log::{FailurePhase, PluginFailureRecord, PLUGIN_EVENTS_TARGET};
pub use logger::{init_logger, LogOptions};
