//! `plugbus-plugins`: plugin registration and dispatch for the engine
//! master.
//!
//! Two plugin domains share one registry implementation:
//! - DAG setup plugins, driven by [`DagSetupPluginManager`] through the six
//!   preparation stages of one DAG
//! - execution plugins, fed heartbeats, master events and commits by
//!   [`DagExecutionPluginManager`] while the application runs

pub mod environment;
pub mod execution;
pub mod handoff;
pub mod lifecycle;
pub mod plugin;
pub mod registry;
pub mod resolver;
pub mod setup;

pub use environment::{StaticEnvironment, DEFAULT_METRICS_CAPACITY};
pub use execution::{CommitTracker, DagExecutionPluginManager, ExecutionEnvironment, ExecutionPluginContext};
pub use handoff::{recv_skipping_lag, BroadcastHandoff};
pub use lifecycle::LifecycleState;
pub use plugin::{BoxedHandler, DagExecutionPlugin, DagSetupPlugin, EventHandler, PluginId};
pub use registry::{DispatchReport, HandlerFailure, PluginRegistry};
pub use resolver::PluginResolver;
pub use setup::{DagHandle, DagPhase, DagSetupContext, DagSetupPluginManager};

/// Version reported to execution plugins by [`StaticEnvironment`].
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
