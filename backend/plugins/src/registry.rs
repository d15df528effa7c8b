//! Handler registry and ordered dispatch.
//!
//! Entries are keyed by `PluginId`, so delivery follows resolution order no
//! matter in which order plugins registered. Each plugin holds at most one
//! handler per event type; a handler that fails or panics is contained and
//! the next plugin still receives the event.

use std::collections::{BTreeMap, HashMap};

use plugbus_core::Event;
use plugbus_logging::PluginFailureRecord;
use tracing::debug;

use crate::lifecycle::Guarded;
use crate::plugin::{BoxedHandler, PluginId};

// ---------------------------------------------------------------------------
// Dispatch outcome
// ---------------------------------------------------------------------------

/// A handler failure that was contained during dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub plugin_id: PluginId,
    pub plugin: String,
    pub event_type: String,
    pub error: String,
    pub panicked: bool,
}

/// What happened during one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that ran to completion without error.
    pub delivered: usize,
    pub failures: Vec<HandlerFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Handlers invoked, successful or not.
    pub fn attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct PluginEntry<E: Event> {
    name: String,
    handlers: HashMap<E::Kind, BoxedHandler<E>>,
}

/// Registration entries for one plugin domain.
pub struct PluginRegistry<E: Event> {
    entries: BTreeMap<PluginId, PluginEntry<E>>,
}

impl<E: Event> Default for PluginRegistry<E> {
    fn default() -> Self {
        Self { entries: BTreeMap::new() }
    }
}

impl<E: Event> PluginRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a plugin's display name. Called by the managers before the
    /// plugin's `setup`, so failures can be attributed by name.
    pub fn enroll(&mut self, owner: PluginId, name: impl Into<String>) {
        let name = name.into();
        self.entries
            .entry(owner)
            .and_modify(|entry| entry.name = name.clone())
            .or_insert_with(|| PluginEntry { name, handlers: HashMap::new() });
    }

    /// Register `handler` for `event_type` on behalf of `owner`, replacing
    /// any handler that plugin had for the same type. Returns the replaced
    /// handler.
    pub fn register(
        &mut self,
        event_type: E::Kind,
        handler: BoxedHandler<E>,
        owner: PluginId,
    ) -> Option<BoxedHandler<E>> {
        let entry = self
            .entries
            .entry(owner)
            .or_insert_with(|| PluginEntry { name: owner.to_string(), handlers: HashMap::new() });
        let replaced = entry.handlers.insert(event_type, handler);
        if replaced.is_some() {
            debug!(plugin = %entry.name, plugin_id = owner.ordinal(), event_type = %event_type, "[Plugins] Handler replaced");
        }
        replaced
    }

    /// Deliver `event` to every plugin with a handler for its type, in
    /// resolution order.
    pub fn dispatch(&self, event: &E) -> DispatchReport {
        let event_type = event.event_type();
        let mut report = DispatchReport::default();

        for (id, entry) in &self.entries {
            let Some(handler) = entry.handlers.get(&event_type) else {
                continue;
            };
            debug!(plugin = %entry.name, plugin_id = id.ordinal(), event_type = %event_type, "[Plugins] Dispatching");

            let (error, panicked) = match Guarded::run(|| handler.handle(event)) {
                Guarded::Ok(()) => {
                    report.delivered += 1;
                    continue;
                }
                Guarded::Failed(err) => (format!("{err:#}"), false),
                Guarded::Panicked(msg) => (msg, true),
            };
            PluginFailureRecord::dispatch(&entry.name, id.ordinal(), event_type, &error, panicked).emit();
            report.failures.push(HandlerFailure {
                plugin_id: *id,
                plugin: entry.name.clone(),
                event_type: event_type.to_string(),
                error,
                panicked,
            });
        }
        report
    }

    pub fn is_registered(&self, owner: PluginId, event_type: E::Kind) -> bool {
        self.entries
            .get(&owner)
            .is_some_and(|entry| entry.handlers.contains_key(&event_type))
    }

    /// Total handlers across all plugins.
    pub fn handler_count(&self) -> usize {
        self.entries.values().map(|entry| entry.handlers.len()).sum()
    }

    pub fn plugin_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handler_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use plugbus_core::{ExecutionEvent, ExecutionEventType, SetupEvent, SetupEventType};

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, label: &'static str) -> BoxedHandler<SetupEvent> {
        let log = Arc::clone(log);
        Box::new(move |_: &SetupEvent| -> anyhow::Result<()> {
            log.lock().unwrap().push(label.to_string());
            Ok(())
        })
    }

    #[test]
    fn empty_registry_dispatch_is_noop() {
        let registry = PluginRegistry::<SetupEvent>::new();
        let report = registry.dispatch(&SetupEvent::new(SetupEventType::PrePopulateDag));
        assert_eq!(report, DispatchReport::default());
        assert!(registry.is_empty());
    }

    #[test]
    fn re_registration_replaces_handler() {
        let log: Log = Arc::default();
        let mut registry = PluginRegistry::new();
        let p = PluginId::new(0);
        assert!(registry.register(SetupEventType::PreValidateDag, recorder(&log, "h1"), p).is_none());
        assert!(registry.register(SetupEventType::PreValidateDag, recorder(&log, "h2"), p).is_some());

        registry.dispatch(&SetupEvent::new(SetupEventType::PreValidateDag));
        assert_eq!(*log.lock().unwrap(), vec!["h2"]);
        assert_eq!(registry.handler_count(), 1);
    }

    #[test]
    fn delivery_follows_resolution_order_not_registration_order() {
        let log: Log = Arc::default();
        let mut registry = PluginRegistry::new();
        registry.register(SetupEventType::PostPopulateDag, recorder(&log, "second"), PluginId::new(1));
        registry.register(SetupEventType::PostPopulateDag, recorder(&log, "first"), PluginId::new(0));

        let report = registry.dispatch(&SetupEvent::new(SetupEventType::PostPopulateDag));
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(report.delivered, 2);
    }

    #[test]
    fn missing_handler_is_skipped() {
        let log: Log = Arc::default();
        let mut registry = PluginRegistry::new();
        registry.register(SetupEventType::PreConfigureDag, recorder(&log, "a-configure"), PluginId::new(0));
        registry.register(SetupEventType::PostConfigureDag, recorder(&log, "b-post"), PluginId::new(1));

        let report = registry.dispatch(&SetupEvent::new(SetupEventType::PostConfigureDag));
        assert_eq!(report.attempted(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["b-post"]);
        assert!(registry.is_registered(PluginId::new(0), SetupEventType::PreConfigureDag));
        assert!(!registry.is_registered(PluginId::new(0), SetupEventType::PostConfigureDag));
    }

    #[test]
    fn failures_and_panics_are_contained() {
        let log: Log = Arc::default();
        let mut registry: PluginRegistry<ExecutionEvent> = PluginRegistry::new();
        registry.enroll(PluginId::new(0), "failing");
        registry.enroll(PluginId::new(1), "panicking");
        registry.enroll(PluginId::new(2), "healthy");
        registry.register(
            ExecutionEventType::Commit,
            Box::new(|_: &ExecutionEvent| -> anyhow::Result<()> { anyhow::bail!("store unavailable") }),
            PluginId::new(0),
        );
        registry.register(
            ExecutionEventType::Commit,
            Box::new(|_: &ExecutionEvent| -> anyhow::Result<()> { panic!("index out of range") }),
            PluginId::new(1),
        );
        let sink = Arc::clone(&log);
        registry.register(
            ExecutionEventType::Commit,
            Box::new(move |event: &ExecutionEvent| -> anyhow::Result<()> {
                sink.lock().unwrap().push(format!("{:?}", event.commit_window().map(u64::from)));
                Ok(())
            }),
            PluginId::new(2),
        );

        let report = registry.dispatch(&ExecutionEvent::commit(7u64));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].plugin, "failing");
        assert!(!report.failures[0].panicked);
        assert_eq!(report.failures[1].plugin, "panicking");
        assert!(report.failures[1].panicked);
        assert_eq!(report.failures[1].event_type, "COMMIT");
        assert_eq!(*log.lock().unwrap(), vec!["Some(7)"]);
    }

    #[test]
    fn registry_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PluginRegistry<SetupEvent>>();
        assert_send_sync::<PluginRegistry<ExecutionEvent>>();
    }
}
