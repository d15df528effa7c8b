//! Execution plugins: the engine-facing environment contract, the context
//! handed to each plugin's `setup`, and the runtime dispatcher.
//!
//! Events are delivered synchronously on the caller's thread. Heartbeats
//! should be passed in after the engine has processed them, and in the
//! order they arrived from each worker; the dispatcher adds no buffering
//! that could reorder them.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use plugbus_config::{Configuration, EXECUTION_PLUGINS_KEY};
use plugbus_core::{
    AppContext, AppStats, ContainerHeartbeat, Event, ExecutionEvent, ExecutionEventType, LogicalOperatorInfo, MasterEvent,
    OperatorStats, PluginError, Result, WindowId, WindowMetrics,
};
use tracing::{debug, info, warn};

use crate::lifecycle::{teardown_all, Guarded, LifecycleState};
use crate::plugin::{in_resolution_order, DagExecutionPlugin, EventHandler, PluginId};
use crate::registry::{DispatchReport, PluginRegistry};
use crate::resolver::PluginResolver;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Read-only view of the running application, implemented by the engine.
///
/// Every accessor returns a snapshot; plugins never hold references into
/// engine state.
pub trait ExecutionEnvironment<G>: Send + Sync {
    fn engine_version(&self) -> &str;

    /// Identity and launch metadata of the application.
    fn application_context(&self) -> AppContext;

    fn application_stats(&self) -> AppStats;

    /// Configuration the application was launched with.
    fn launch_configuration(&self) -> Arc<Configuration>;

    fn dag(&self) -> Arc<G>;

    fn operator_name(&self, operator_id: i32) -> Option<String>;

    fn operator_stats(&self, operator_id: i32) -> Option<OperatorStats>;

    fn logical_operators(&self) -> Vec<LogicalOperatorInfo>;

    /// Most recent window metrics published by the named logical operator,
    /// oldest first.
    fn window_metrics(&self, operator_name: &str) -> VecDeque<WindowMetrics>;

    /// Wall-clock start of `window` in epoch milliseconds.
    fn window_id_to_millis(&self, window: WindowId) -> i64;
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// What an execution plugin sees during its `setup` call.
pub struct ExecutionPluginContext<'a, G> {
    owner: PluginId,
    environment: &'a Arc<dyn ExecutionEnvironment<G>>,
    registry: &'a mut PluginRegistry<ExecutionEvent>,
}

impl<'a, G: 'static> ExecutionPluginContext<'a, G> {
    pub fn owner(&self) -> PluginId {
        self.owner
    }

    /// Shared handle to the environment, for handlers that query it later.
    pub fn environment(&self) -> Arc<dyn ExecutionEnvironment<G>> {
        Arc::clone(self.environment)
    }

    pub fn engine_version(&self) -> &str {
        self.environment.engine_version()
    }

    pub fn application_context(&self) -> AppContext {
        self.environment.application_context()
    }

    pub fn application_stats(&self) -> AppStats {
        self.environment.application_stats()
    }

    pub fn launch_configuration(&self) -> Arc<Configuration> {
        self.environment.launch_configuration()
    }

    pub fn dag(&self) -> Arc<G> {
        self.environment.dag()
    }

    pub fn operator_name(&self, operator_id: i32) -> Option<String> {
        self.environment.operator_name(operator_id)
    }

    pub fn operator_stats(&self, operator_id: i32) -> Option<OperatorStats> {
        self.environment.operator_stats(operator_id)
    }

    pub fn logical_operators(&self) -> Vec<LogicalOperatorInfo> {
        self.environment.logical_operators()
    }

    pub fn window_metrics(&self, operator_name: &str) -> VecDeque<WindowMetrics> {
        self.environment.window_metrics(operator_name)
    }

    pub fn window_id_to_millis(&self, window: WindowId) -> i64 {
        self.environment.window_id_to_millis(window)
    }

    pub fn register<F>(&mut self, event_type: ExecutionEventType, handler: F)
    where
        F: Fn(&ExecutionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registry.register(event_type, Box::new(handler), self.owner);
    }

    pub fn register_handler<H>(&mut self, event_type: ExecutionEventType, handler: H)
    where
        H: EventHandler<ExecutionEvent> + 'static,
    {
        self.registry.register(event_type, Box::new(handler), self.owner);
    }

    pub fn on_heartbeat<F>(&mut self, handler: F)
    where
        F: Fn(&ContainerHeartbeat) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(ExecutionEventType::Heartbeat, move |event: &ExecutionEvent| {
            event.as_heartbeat().map_or(Ok(()), &handler)
        });
    }

    pub fn on_master_event<F>(&mut self, handler: F)
    where
        F: Fn(&MasterEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(ExecutionEventType::MasterEvent, move |event: &ExecutionEvent| {
            event.as_master().map_or(Ok(()), &handler)
        });
    }

    pub fn on_commit<F>(&mut self, handler: F)
    where
        F: Fn(WindowId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(ExecutionEventType::Commit, move |event: &ExecutionEvent| {
            event.commit_window().map_or(Ok(()), &handler)
        });
    }
}

// ---------------------------------------------------------------------------
// Commit tracking
// ---------------------------------------------------------------------------

/// Keeps committed windows strictly increasing across dispatches.
///
/// The lock is held while the commit is delivered, so two threads
/// committing concurrently cannot deliver out of order.
#[derive(Debug, Default)]
pub struct CommitTracker {
    last: Mutex<Option<WindowId>>,
}

impl CommitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `deliver` if `window` is past the last delivered window.
    pub fn advance<R>(&self, window: WindowId, deliver: impl FnOnce() -> R) -> Option<R> {
        let mut last = self.last.lock();
        if last.is_some_and(|previous| window <= previous) {
            return None;
        }
        *last = Some(window);
        Some(deliver())
    }

    pub fn last_committed(&self) -> Option<WindowId> {
        *self.last.lock()
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

type ExecutionPlugins<G> = Vec<(PluginId, Box<dyn DagExecutionPlugin<G>>)>;

/// Owns the execution plugins of a running application and delivers
/// runtime events to them.
///
/// Dispatch takes `&self`, so a set-up manager can be shared across the
/// threads that process heartbeats.
pub struct DagExecutionPluginManager<G> {
    plugins: Mutex<ExecutionPlugins<G>>,
    registry: PluginRegistry<ExecutionEvent>,
    environment: Arc<dyn ExecutionEnvironment<G>>,
    commits: CommitTracker,
    state: LifecycleState,
}

impl<G: 'static> DagExecutionPluginManager<G> {
    /// `plugins` must be in resolution order; each one is identified by its
    /// position.
    pub fn new(plugins: Vec<Box<dyn DagExecutionPlugin<G>>>, environment: Arc<dyn ExecutionEnvironment<G>>) -> Self {
        Self {
            plugins: Mutex::new(in_resolution_order(plugins)),
            registry: PluginRegistry::new(),
            environment,
            commits: CommitTracker::new(),
            state: LifecycleState::NotSetUp,
        }
    }

    /// Resolve the plugins listed under the execution key of the launch
    /// configuration.
    pub fn from_resolver(
        resolver: &PluginResolver<dyn DagExecutionPlugin<G>>,
        environment: Arc<dyn ExecutionEnvironment<G>>,
    ) -> Result<Self> {
        let plugins = resolver.resolve(&environment.launch_configuration(), EXECUTION_PLUGINS_KEY)?;
        Ok(Self::new(plugins, environment))
    }

    /// Call `setup` on every plugin in resolution order, rolling back the
    /// plugins already set up if one fails.
    pub fn setup(&mut self) -> Result<()> {
        if self.state != LifecycleState::NotSetUp {
            return Err(PluginError::InvalidState {
                operation: "set up plugins",
                state: self.state.to_string(),
            });
        }

        let plugins = self.plugins.get_mut();
        let mut failure = None;
        for (index, (id, plugin)) in plugins.iter_mut().enumerate() {
            let name = plugin.name().to_string();
            self.registry.enroll(*id, name.as_str());

            let mut context = ExecutionPluginContext {
                owner: *id,
                environment: &self.environment,
                registry: &mut self.registry,
            };
            match Guarded::run(|| plugin.setup(&mut context)).into_result() {
                Ok(()) => debug!(plugin = %name, plugin_id = id.ordinal(), "[Plugins] Execution plugin ready"),
                Err(cause) => {
                    failure = Some((index, name, cause));
                    break;
                }
            }
        }

        if let Some((index, plugin, cause)) = failure {
            warn!(plugin = %plugin, error = %cause, "[Plugins] Setup failed, rolling back");
            teardown_all(plugins[..index].iter_mut());
            self.state = LifecycleState::TornDown;
            return Err(PluginError::Setup { plugin, cause });
        }

        self.state = LifecycleState::SetUp;
        info!(
            plugins = plugins.len(),
            handlers = self.registry.handler_count(),
            "[Plugins] Execution plugins ready"
        );
        Ok(())
    }

    /// Deliver `event` to every plugin with a handler for its type. Outside
    /// the `SetUp` state nothing is delivered. Commit events at or below the
    /// last delivered window are dropped.
    pub fn dispatch(&self, event: &ExecutionEvent) -> DispatchReport {
        match event.commit_window() {
            Some(window) => self.dispatch_commit(window, event).unwrap_or_default(),
            None if self.accepting(event.event_type()) => self.registry.dispatch(event),
            None => DispatchReport::default(),
        }
    }

    /// Deliver a worker heartbeat the engine has finished processing.
    pub fn heartbeat(&self, heartbeat: ContainerHeartbeat) -> DispatchReport {
        self.dispatch(&ExecutionEvent::heartbeat(heartbeat))
    }

    pub fn master_event(&self, event: MasterEvent) -> DispatchReport {
        self.dispatch(&ExecutionEvent::master(event))
    }

    /// Announce a new committed window. Returns `None` when nothing was
    /// delivered: the window did not advance, or the manager is not set up.
    pub fn commit(&self, window: impl Into<WindowId>) -> Option<DispatchReport> {
        let window = window.into();
        self.dispatch_commit(window, &ExecutionEvent::commit(window))
    }

    fn dispatch_commit(&self, window: WindowId, event: &ExecutionEvent) -> Option<DispatchReport> {
        if !self.accepting(ExecutionEventType::Commit) {
            return None;
        }
        let report = self.commits.advance(window, || self.registry.dispatch(event));
        if report.is_none() {
            debug!(window = %window, last = ?self.commits.last_committed(), "[Plugins] Stale commit suppressed");
        }
        report
    }

    fn accepting(&self, event_type: ExecutionEventType) -> bool {
        let accepting = self.state == LifecycleState::SetUp;
        if !accepting {
            debug!(event_type = %event_type, state = %self.state, "[Plugins] Event dropped");
        }
        accepting
    }

    /// Tear every plugin down in resolution order, returning the names of
    /// plugins whose teardown failed.
    pub fn teardown(&mut self) -> Result<Vec<String>> {
        let failed = match self.state {
            LifecycleState::SetUp => teardown_all(self.plugins.get_mut().iter_mut()),
            LifecycleState::NotSetUp => Vec::new(),
            LifecycleState::TornDown => {
                return Err(PluginError::InvalidState {
                    operation: "tear down plugins",
                    state: self.state.to_string(),
                })
            }
        };
        self.state = LifecycleState::TornDown;
        Ok(failed)
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn registry(&self) -> &PluginRegistry<ExecutionEvent> {
        &self.registry
    }

    pub fn environment(&self) -> &Arc<dyn ExecutionEnvironment<G>> {
        &self.environment
    }

    pub fn last_committed(&self) -> Option<WindowId> {
        self.commits.last_committed()
    }
}
