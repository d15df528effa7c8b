//! DAG setup plugins: the per-preparation manager and the context handed
//! to each plugin's `setup`.
//!
//! Driving order for one preparation run:
//!
//! ```text
//! setup(dag) -> PRE_POPULATE_DAG -> POST_POPULATE_DAG -> PRE_CONFIGURE_DAG
//!            -> POST_CONFIGURE_DAG -> PRE_VALIDATE_DAG -> POST_VALIDATE_DAG
//!            -> teardown()
//! ```
//!
//! The manager rejects any other order.

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use plugbus_config::{Configuration, DAG_SETUP_PLUGINS_KEY};
use plugbus_core::{PluginError, Result, SetupEvent, SetupEventType};
use tracing::{debug, info, warn};

use crate::lifecycle::{teardown_all, Guarded, LifecycleState};
use crate::plugin::{in_resolution_order, DagSetupPlugin, EventHandler, PluginId};
use crate::registry::{DispatchReport, PluginRegistry};
use crate::resolver::PluginResolver;

// ---------------------------------------------------------------------------
// DAG handle
// ---------------------------------------------------------------------------

/// Shared, lock-guarded DAG under preparation. Clones refer to the same
/// DAG, so handlers may capture one. Plugins that modify the DAG get no
/// coordination from the fabric beyond the lock itself.
pub struct DagHandle<G>(Arc<RwLock<G>>);

impl<G> DagHandle<G> {
    pub fn new(dag: G) -> Self {
        Self(Arc::new(RwLock::new(dag)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, G> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, G> {
        self.0.write()
    }

    /// Recover the DAG once every other handle has been dropped.
    pub fn try_into_inner(self) -> std::result::Result<G, Self> {
        Arc::try_unwrap(self.0).map(RwLock::into_inner).map_err(Self)
    }
}

impl<G> Clone for DagHandle<G> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<G: fmt::Debug> fmt::Debug for DagHandle<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DagHandle").field(&*self.0.read()).finish()
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// What a setup plugin sees during its `setup` call.
pub struct DagSetupContext<'a, G> {
    owner: PluginId,
    dag: &'a DagHandle<G>,
    configuration: &'a Arc<Configuration>,
    registry: &'a mut PluginRegistry<SetupEvent>,
}

impl<'a, G> DagSetupContext<'a, G> {
    pub fn owner(&self) -> PluginId {
        self.owner
    }

    pub fn dag(&self) -> &DagHandle<G> {
        self.dag
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        self.configuration
    }

    /// Register a closure for `event_type`, replacing this plugin's previous
    /// handler for that stage.
    pub fn register<F>(&mut self, event_type: SetupEventType, handler: F)
    where
        F: Fn(&SetupEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registry.register(event_type, Box::new(handler), self.owner);
    }

    pub fn register_handler<H>(&mut self, event_type: SetupEventType, handler: H)
    where
        H: EventHandler<SetupEvent> + 'static,
    {
        self.registry.register(event_type, Box::new(handler), self.owner);
    }
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// Preparation step bracketed by a PRE/POST stage pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DagPhase {
    Populate,
    Configure,
    Validate,
}

impl DagPhase {
    pub fn pre(self) -> SetupEventType {
        match self {
            Self::Populate => SetupEventType::PrePopulateDag,
            Self::Configure => SetupEventType::PreConfigureDag,
            Self::Validate => SetupEventType::PreValidateDag,
        }
    }

    pub fn post(self) -> SetupEventType {
        match self {
            Self::Populate => SetupEventType::PostPopulateDag,
            Self::Configure => SetupEventType::PostConfigureDag,
            Self::Validate => SetupEventType::PostValidateDag,
        }
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Owns the setup plugins of one DAG preparation run. Build a new manager
/// for every run; managers are not reusable after teardown.
pub struct DagSetupPluginManager<G> {
    plugins: Vec<(PluginId, Box<dyn DagSetupPlugin<G>>)>,
    registry: PluginRegistry<SetupEvent>,
    configuration: Arc<Configuration>,
    dag: Option<DagHandle<G>>,
    state: LifecycleState,
    next_stage: Option<SetupEventType>,
}

impl<G: 'static> DagSetupPluginManager<G> {
    /// `plugins` must be in resolution order; each one is identified by its
    /// position.
    pub fn new(plugins: Vec<Box<dyn DagSetupPlugin<G>>>, configuration: Arc<Configuration>) -> Self {
        Self {
            plugins: in_resolution_order(plugins),
            registry: PluginRegistry::new(),
            configuration,
            dag: None,
            state: LifecycleState::NotSetUp,
            next_stage: Some(SetupEventType::PrePopulateDag),
        }
    }

    /// Resolve the plugins listed under the DAG setup key and wrap them in a
    /// fresh manager.
    pub fn for_preparation(
        resolver: &PluginResolver<dyn DagSetupPlugin<G>>,
        configuration: Arc<Configuration>,
    ) -> Result<Self> {
        let plugins = resolver.resolve(&configuration, DAG_SETUP_PLUGINS_KEY)?;
        Ok(Self::new(plugins, configuration))
    }

    /// Call `setup` on every plugin in resolution order.
    ///
    /// If a plugin fails, the plugins set up before it are torn down and the
    /// manager moves to `TornDown`.
    pub fn setup(&mut self, dag: DagHandle<G>) -> Result<()> {
        self.require(LifecycleState::NotSetUp, "set up plugins")?;
        let dag: &DagHandle<G> = self.dag.insert(dag);

        let mut failure = None;
        for index in 0..self.plugins.len() {
            let (id, plugin) = &mut self.plugins[index];
            let name = plugin.name().to_string();
            self.registry.enroll(*id, name.as_str());

            let mut context = DagSetupContext {
                owner: *id,
                dag,
                configuration: &self.configuration,
                registry: &mut self.registry,
            };
            match Guarded::run(|| plugin.setup(&mut context)).into_result() {
                Ok(()) => debug!(plugin = %name, plugin_id = id.ordinal(), "[Plugins] Setup plugin ready"),
                Err(cause) => {
                    failure = Some((index, name, cause));
                    break;
                }
            }
        }

        if let Some((index, plugin, cause)) = failure {
            warn!(plugin = %plugin, error = %cause, "[Plugins] Setup failed, rolling back");
            teardown_all(self.plugins[..index].iter_mut());
            self.state = LifecycleState::TornDown;
            return Err(PluginError::Setup { plugin, cause });
        }

        self.state = LifecycleState::SetUp;
        info!(
            plugins = self.plugins.len(),
            handlers = self.registry.handler_count(),
            "[Plugins] DAG setup plugins ready"
        );
        Ok(())
    }

    /// Fire one lifecycle stage. Stages must arrive in canonical order,
    /// each exactly once, between `setup` and `teardown`.
    pub fn lifecycle_event(&mut self, stage: SetupEventType) -> Result<DispatchReport> {
        self.require(LifecycleState::SetUp, "fire a lifecycle stage")?;
        if self.next_stage != Some(stage) {
            return Err(PluginError::StageOutOfOrder { expected: self.next_stage, actual: stage });
        }
        self.next_stage = stage.next();

        let report = self.registry.dispatch(&SetupEvent::new(stage));
        debug!(stage = %stage, delivered = report.delivered, failed = report.failures.len(), "[Plugins] Stage dispatched");
        Ok(report)
    }

    /// Fire `PRE_x`, run the engine's `step`, then fire `POST_x`. A failing
    /// step skips `POST_x`.
    pub fn around<T, F>(&mut self, phase: DagPhase, step: F) -> anyhow::Result<T>
    where
        F: FnOnce(&DagHandle<G>) -> anyhow::Result<T>,
    {
        self.lifecycle_event(phase.pre())?;
        let dag = self.dag.clone().ok_or_else(|| PluginError::InvalidState {
            operation: "run a preparation step",
            state: "no DAG attached".to_string(),
        })?;
        let value = step(&dag)?;
        self.lifecycle_event(phase.post())?;
        Ok(value)
    }

    pub fn populate<T>(&mut self, step: impl FnOnce(&DagHandle<G>) -> anyhow::Result<T>) -> anyhow::Result<T> {
        self.around(DagPhase::Populate, step)
    }

    pub fn configure<T>(&mut self, step: impl FnOnce(&DagHandle<G>) -> anyhow::Result<T>) -> anyhow::Result<T> {
        self.around(DagPhase::Configure, step)
    }

    pub fn validate<T>(&mut self, step: impl FnOnce(&DagHandle<G>) -> anyhow::Result<T>) -> anyhow::Result<T> {
        self.around(DagPhase::Validate, step)
    }

    /// Tear every plugin down in resolution order. Returns the names of
    /// plugins whose teardown failed; those failures are logged, never fatal.
    pub fn teardown(&mut self) -> Result<Vec<String>> {
        let failed = match self.state {
            LifecycleState::SetUp => teardown_all(self.plugins.iter_mut()),
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

    /// The stage the manager expects next, or `None` once validation has
    /// been announced.
    pub fn next_stage(&self) -> Option<SetupEventType> {
        self.next_stage
    }

    pub fn registry(&self) -> &PluginRegistry<SetupEvent> {
        &self.registry
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    pub fn dag(&self) -> Option<&DagHandle<G>> {
        self.dag.as_ref()
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    fn require(&self, expected: LifecycleState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PluginError::InvalidState { operation, state: self.state.to_string() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Dag {
        operators: Vec<String>,
    }

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Records every stage it sees and every lifecycle call it receives.
    struct Tracer {
        label: &'static str,
        journal: Journal,
        fail_setup: bool,
    }

    impl DagSetupPlugin<Dag> for Tracer {
        fn name(&self) -> &str {
            self.label
        }

        fn setup(&mut self, context: &mut DagSetupContext<'_, Dag>) -> anyhow::Result<()> {
            self.journal.lock().unwrap().push(format!("{}:setup", self.label));
            anyhow::ensure!(!self.fail_setup, "refusing to set up");
            for stage in SetupEventType::ALL {
                let journal = Arc::clone(&self.journal);
                let label = self.label;
                context.register(stage, move |event: &SetupEvent| -> anyhow::Result<()> {
                    journal.lock().unwrap().push(format!("{label}:{event:?}"));
                    Ok(())
                });
            }
            Ok(())
        }

        fn teardown(&mut self) -> anyhow::Result<()> {
            self.journal.lock().unwrap().push(format!("{}:teardown", self.label));
            Ok(())
        }
    }

    fn tracer(journal: &Journal, label: &'static str, fail_setup: bool) -> Box<dyn DagSetupPlugin<Dag>> {
        Box::new(Tracer { label, journal: Arc::clone(journal), fail_setup })
    }

    fn manager(plugins: Vec<Box<dyn DagSetupPlugin<Dag>>>) -> DagSetupPluginManager<Dag> {
        DagSetupPluginManager::new(plugins, Arc::new(Configuration::new()))
    }

    #[test]
    fn stage_before_setup_is_rejected() {
        let mut manager = manager(Vec::new());
        let err = manager.lifecycle_event(SetupEventType::PrePopulateDag).unwrap_err();
        assert!(matches!(err, PluginError::InvalidState { .. }));
    }

    #[test]
    fn stages_must_follow_canonical_order() {
        let mut manager = manager(Vec::new());
        manager.setup(DagHandle::new(Dag::default())).unwrap();
        let err = manager.lifecycle_event(SetupEventType::PreValidateDag).unwrap_err();
        assert!(matches!(
            err,
            PluginError::StageOutOfOrder {
                expected: Some(SetupEventType::PrePopulateDag),
                actual: SetupEventType::PreValidateDag
            }
        ));

        for stage in SetupEventType::ALL {
            manager.lifecycle_event(stage).unwrap();
        }
        assert_eq!(manager.next_stage(), None);
        let err = manager.lifecycle_event(SetupEventType::PostValidateDag).unwrap_err();
        assert!(matches!(err, PluginError::StageOutOfOrder { expected: None, .. }));
    }

    #[test]
    fn second_setup_is_rejected() {
        let mut manager = manager(Vec::new());
        manager.setup(DagHandle::new(Dag::default())).unwrap();
        assert!(manager.setup(DagHandle::new(Dag::default())).is_err());
    }

    #[test]
    fn setup_failure_rolls_back_earlier_plugins() {
        let journal: Journal = Arc::default();
        let mut manager = manager(vec![
            tracer(&journal, "a", false),
            tracer(&journal, "b", true),
            tracer(&journal, "c", false),
        ]);
        let err = manager.setup(DagHandle::new(Dag::default())).unwrap_err();
        assert!(matches!(err, PluginError::Setup { ref plugin, .. } if plugin == "b"));
        assert_eq!(manager.state(), LifecycleState::TornDown);
        assert_eq!(*journal.lock().unwrap(), vec!["a:setup", "b:setup", "a:teardown"]);
    }

    #[test]
    fn setup_panic_is_reported_as_setup_error() {
        struct Exploding;
        impl DagSetupPlugin<Dag> for Exploding {
            fn setup(&mut self, _context: &mut DagSetupContext<'_, Dag>) -> anyhow::Result<()> {
                panic!("bad plugin")
            }
        }
        let mut manager = manager(vec![Box::new(Exploding) as Box<dyn DagSetupPlugin<Dag>>]);
        let err = manager.setup(DagHandle::new(Dag::default())).unwrap_err();
        assert!(err.to_string().contains("panicked: bad plugin"));
    }

    #[test]
    fn around_brackets_engine_step() {
        let journal: Journal = Arc::default();
        let mut manager = manager(vec![tracer(&journal, "t", false)]);
        manager.setup(DagHandle::new(Dag::default())).unwrap();

        let added = manager
            .populate(|dag| {
                dag.write().operators.push("input".into());
                Ok(dag.read().operators.len())
            })
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(
            journal.lock().unwrap()[1..],
            ["t:SetupEvent { event_type: PrePopulateDag }", "t:SetupEvent { event_type: PostPopulateDag }"]
        );
    }

    #[test]
    fn failed_step_skips_post_event() {
        let mut manager = manager(Vec::new());
        manager.setup(DagHandle::new(Dag::default())).unwrap();
        let result: anyhow::Result<()> = manager.populate(|_| anyhow::bail!("source unreachable"));
        assert!(result.is_err());
        assert_eq!(manager.next_stage(), Some(SetupEventType::PostPopulateDag));
    }

    #[test]
    fn teardown_runs_once() {
        let journal: Journal = Arc::default();
        let mut manager = manager(vec![tracer(&journal, "a", false), tracer(&journal, "b", false)]);
        manager.setup(DagHandle::new(Dag::default())).unwrap();
        assert!(manager.teardown().unwrap().is_empty());
        assert!(manager.teardown().is_err());
        let journal = journal.lock().unwrap();
        assert_eq!(journal[journal.len() - 2..], ["a:teardown", "b:teardown"]);
    }

    #[test]
    fn dag_handle_is_shared() {
        let handle = DagHandle::new(Dag::default());
        let clone = handle.clone();
        clone.write().operators.push("x".into());
        drop(clone);
        assert_eq!(handle.try_into_inner().unwrap().operators, vec!["x"]);
    }
}
