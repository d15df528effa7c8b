//! Plugin contracts for the two plugin domains.
//!
//! A plugin registers handlers from `setup`, and only from `setup`: the
//! context that allows registration is borrowed for the duration of that
//! call, so nothing can be registered once dispatch begins.

use std::fmt;

use anyhow::Result;

use crate::execution::ExecutionPluginContext;
use crate::setup::DagSetupContext;

/// Identity of a resolved plugin instance: its position in resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(usize);

impl PluginId {
    pub const fn new(ordinal: usize) -> Self {
        Self(ordinal)
    }

    pub fn ordinal(self) -> usize {
        self.0
    }
}

/// Pair each plugin with its position, which is the only identity a
/// plugin gets. Managers never accept ids from callers.
pub(crate) fn in_resolution_order<T>(plugins: Vec<T>) -> Vec<(PluginId, T)> {
    plugins.into_iter().enumerate().map(|(ordinal, plugin)| (PluginId::new(ordinal), plugin)).collect()
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handles one kind of event. Runs synchronously on the dispatching thread
/// and should return quickly; long work belongs on a task the plugin owns.
pub trait EventHandler<E>: Send + Sync {
    fn handle(&self, event: &E) -> Result<()>;
}

impl<E, F> EventHandler<E> for F
where
    F: Fn(&E) -> Result<()> + Send + Sync,
{
    fn handle(&self, event: &E) -> Result<()> {
        self(event)
    }
}

pub type BoxedHandler<E> = Box<dyn EventHandler<E>>;

/// Plugin that observes and may modify the DAG while it is prepared.
pub trait DagSetupPlugin<G>: Send {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called once per preparation run, before any stage event.
    fn setup(&mut self, context: &mut DagSetupContext<'_, G>) -> Result<()>;

    fn teardown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Plugin that observes a running application.
pub trait DagExecutionPlugin<G>: Send {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn setup(&mut self, context: &mut ExecutionPluginContext<'_, G>) -> Result<()>;

    /// Must stop any task or thread the plugin started.
    fn teardown(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugbus_core::{Event, SetupEvent, SetupEventType};

    struct Named;

    impl DagSetupPlugin<()> for Named {
        fn setup(&mut self, _context: &mut DagSetupContext<'_, ()>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn default_name_is_type_name() {
        let plugin: Box<dyn DagSetupPlugin<()>> = Box::new(Named);
        assert!(plugin.name().ends_with("Named"));
    }

    #[test]
    fn closures_are_handlers() {
        let handler: BoxedHandler<SetupEvent> = Box::new(|event: &SetupEvent| {
            anyhow::ensure!(event.event_type() == SetupEventType::PreValidateDag, "wrong stage");
            Ok(())
        });
        assert!(handler.handle(&SetupEvent::new(SetupEventType::PreValidateDag)).is_ok());
        assert!(handler.handle(&SetupEvent::new(SetupEventType::PostValidateDag)).is_err());
    }

    #[test]
    fn plugin_ids_order_by_resolution() {
        assert!(PluginId::new(0) < PluginId::new(1));
        assert_eq!(PluginId::new(3).to_string(), "#3");
    }

    #[test]
    fn identities_follow_position() {
        let ids: Vec<usize> = in_resolution_order(vec!["a", "a", "b"]).into_iter().map(|(id, _)| id.ordinal()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
