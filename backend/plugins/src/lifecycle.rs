//! Plugin lifecycle state and the guarded invocation shared by setup,
//! dispatch and teardown.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use plugbus_logging::PluginFailureRecord;
use tracing::{debug, info};

use crate::plugin::{DagExecutionPlugin, DagSetupPlugin, PluginId};

/// State of a plugin manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotSetUp,
    SetUp,
    TornDown,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotSetUp => "not set up",
            Self::SetUp => "set up",
            Self::TornDown => "torn down",
        };
        f.write_str(s)
    }
}

/// Outcome of running plugin code behind a panic boundary.
pub(crate) enum Guarded<R> {
    Ok(R),
    Failed(anyhow::Error),
    Panicked(String),
}

impl<R> Guarded<R> {
    pub(crate) fn run(f: impl FnOnce() -> anyhow::Result<R>) -> Self {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(value)) => Self::Ok(value),
            Ok(Err(err)) => Self::Failed(err),
            Err(payload) => Self::Panicked(panic_message(payload.as_ref())),
        }
    }

    /// Collapse a panic into an error, for callers that propagate.
    pub(crate) fn into_result(self) -> anyhow::Result<R> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Failed(err) => Err(err),
            Self::Panicked(msg) => Err(anyhow::anyhow!("panicked: {msg}")),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Uniform teardown access to both plugin domains.
pub(crate) trait Teardown {
    fn plugin_name(&self) -> &str;
    fn run_teardown(&mut self) -> anyhow::Result<()>;
}

impl<G> Teardown for Box<dyn DagSetupPlugin<G>> {
    fn plugin_name(&self) -> &str {
        self.name()
    }

    fn run_teardown(&mut self) -> anyhow::Result<()> {
        self.teardown()
    }
}

impl<G> Teardown for Box<dyn DagExecutionPlugin<G>> {
    fn plugin_name(&self) -> &str {
        self.name()
    }

    fn run_teardown(&mut self) -> anyhow::Result<()> {
        self.teardown()
    }
}

/// Tear plugins down in the given order. A failing or panicking teardown is
/// logged and skipped; the names of those plugins are returned.
pub(crate) fn teardown_all<'a, T, I>(plugins: I) -> Vec<String>
where
    T: Teardown + 'a,
    I: IntoIterator<Item = &'a mut (PluginId, T)>,
{
    let mut failed = Vec::new();
    for (id, plugin) in plugins {
        let name = plugin.plugin_name().to_string();
        let record = match Guarded::run(|| plugin.run_teardown()) {
            Guarded::Ok(()) => {
                debug!(plugin = %name, plugin_id = id.ordinal(), "Plugin torn down");
                continue;
            }
            Guarded::Failed(err) => PluginFailureRecord::teardown(&name, id.ordinal(), format!("{err:#}"), false),
            Guarded::Panicked(msg) => PluginFailureRecord::teardown(&name, id.ordinal(), msg, true),
        };
        record.emit();
        failed.push(name);
    }
    info!(failed = failed.len(), "Plugin teardown finished");
    failed
}
