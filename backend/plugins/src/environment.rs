//! In-memory [`ExecutionEnvironment`] fed with snapshots by the engine.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use plugbus_config::{Configuration, FIRST_WINDOW_KEY, WINDOW_WIDTH_KEY};
use plugbus_core::{AppContext, AppStats, LogicalOperatorInfo, OperatorStats, WindowClock, WindowId, WindowMetrics};
use tracing::warn;

use crate::execution::ExecutionEnvironment;
use crate::ENGINE_VERSION;

/// Window metrics kept per logical operator unless configured otherwise.
pub const DEFAULT_METRICS_CAPACITY: usize = 100;

struct PhysicalOperator {
    name: String,
    stats: OperatorStats,
}

/// Execution environment backed by snapshots the engine pushes in.
///
/// Readers always get clones, so a plugin holding a snapshot never blocks
/// the engine's next update.
pub struct StaticEnvironment<G> {
    engine_version: String,
    configuration: Arc<Configuration>,
    dag: Arc<G>,
    clock: WindowClock,
    metrics_capacity: usize,
    app_context: RwLock<AppContext>,
    app_stats: RwLock<AppStats>,
    operators: RwLock<HashMap<i32, PhysicalOperator>>,
    logical_operators: RwLock<Vec<LogicalOperatorInfo>>,
    window_metrics: RwLock<HashMap<String, VecDeque<WindowMetrics>>>,
}

impl<G> StaticEnvironment<G> {
    /// The window clock is read from the launch configuration, falling back
    /// to defaults for missing or malformed keys.
    pub fn new(dag: G, configuration: Configuration) -> Self {
        let clock = clock_from(&configuration);
        Self {
            engine_version: ENGINE_VERSION.to_string(),
            configuration: Arc::new(configuration),
            dag: Arc::new(dag),
            clock,
            metrics_capacity: DEFAULT_METRICS_CAPACITY,
            app_context: RwLock::new(AppContext::default()),
            app_stats: RwLock::new(AppStats::default()),
            operators: RwLock::new(HashMap::new()),
            logical_operators: RwLock::new(Vec::new()),
            window_metrics: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = version.into();
        self
    }

    pub fn with_clock(mut self, clock: WindowClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics_capacity(mut self, capacity: usize) -> Self {
        self.metrics_capacity = capacity.max(1);
        self
    }

    pub fn set_application_context(&self, context: AppContext) {
        *self.app_context.write() = context;
    }

    pub fn set_application_stats(&self, stats: AppStats) {
        *self.app_stats.write() = stats;
    }

    /// Insert or replace the snapshot of one physical operator.
    pub fn upsert_operator(&self, name: impl Into<String>, stats: OperatorStats) {
        let operator = PhysicalOperator { name: name.into(), stats };
        self.operators.write().insert(operator.stats.operator_id, operator);
    }

    pub fn remove_operator(&self, operator_id: i32) -> bool {
        self.operators.write().remove(&operator_id).is_some()
    }

    pub fn set_logical_operators(&self, operators: Vec<LogicalOperatorInfo>) {
        *self.logical_operators.write() = operators;
    }

    /// Append metrics for `window`, evicting the oldest entry once the
    /// operator's queue is full.
    pub fn record_window_metrics(
        &self,
        operator_name: &str,
        window: WindowId,
        metrics: std::collections::BTreeMap<String, serde_json::Value>,
    ) {
        let mut all = self.window_metrics.write();
        let queue = all.entry(operator_name.to_string()).or_default();
        while queue.len() >= self.metrics_capacity {
            queue.pop_front();
        }
        queue.push_back((window, metrics));
    }
}

impl<G: Send + Sync> ExecutionEnvironment<G> for StaticEnvironment<G> {
    fn engine_version(&self) -> &str {
        &self.engine_version
    }

    fn application_context(&self) -> AppContext {
        self.app_context.read().clone()
    }

    fn application_stats(&self) -> AppStats {
        self.app_stats.read().clone()
    }

    fn launch_configuration(&self) -> Arc<Configuration> {
        Arc::clone(&self.configuration)
    }

    fn dag(&self) -> Arc<G> {
        Arc::clone(&self.dag)
    }

    fn operator_name(&self, operator_id: i32) -> Option<String> {
        self.operators.read().get(&operator_id).map(|op| op.name.clone())
    }

    fn operator_stats(&self, operator_id: i32) -> Option<OperatorStats> {
        self.operators.read().get(&operator_id).map(|op| op.stats.clone())
    }

    fn logical_operators(&self) -> Vec<LogicalOperatorInfo> {
        self.logical_operators.read().clone()
    }

    fn window_metrics(&self, operator_name: &str) -> VecDeque<WindowMetrics> {
        self.window_metrics.read().get(operator_name).cloned().unwrap_or_default()
    }

    fn window_id_to_millis(&self, window: WindowId) -> i64 {
        self.clock.to_millis(window)
    }
}

fn clock_from(configuration: &Configuration) -> WindowClock {
    let defaults = WindowClock::default();
    let width = configuration.get_u64(WINDOW_WIDTH_KEY).unwrap_or_else(|err| {
        warn!(error = %err, "Ignoring window width");
        None
    });
    let first = configuration.get_i64(FIRST_WINDOW_KEY).unwrap_or_else(|err| {
        warn!(error = %err, "Ignoring first window time");
        None
    });
    WindowClock::new(
        first.unwrap_or(defaults.first_window_millis),
        width.filter(|w| *w > 0).unwrap_or(defaults.window_width_millis),
    )
}
