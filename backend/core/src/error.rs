use thiserror::Error;

use crate::event::SetupEventType;

/// Top-level error type for the plugin fabric.
///
/// Plugin-supplied code (constructors, `setup`, handlers) reports failures
/// as `anyhow::Error`; the fabric wraps them here together with the
/// identity of the plugin that produced them.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("unknown plugin identifier: {id}")]
    UnknownPlugin { id: String },

    #[error("failed to instantiate plugin '{id}': {cause}")]
    Instantiation {
        id: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("setup failed for plugin '{plugin}': {cause}")]
    Setup {
        plugin: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("lifecycle stage {actual} out of order (expected {})", expected_label(.expected))]
    StageOutOfOrder {
        expected: Option<SetupEventType>,
        actual: SetupEventType,
    },

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

fn expected_label(expected: &Option<SetupEventType>) -> String {
    match expected {
        Some(stage) => stage.to_string(),
        None => "no further stages".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
