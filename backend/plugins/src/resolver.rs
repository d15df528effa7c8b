//! Resolution of configured plugin identifiers into live instances.
//!
//! Identifiers map to constructor functions through an explicit table the
//! engine fills at startup. Resolution only constructs; `setup` is left to
//! the managers.

use std::collections::BTreeMap;
use std::fmt;

use plugbus_config::Configuration;
use plugbus_core::{PluginError, Result};
use tracing::{debug, info};


/// Identifier → constructor table for one plugin domain.
///
/// `P` is the plugin trait object, e.g. `dyn DagSetupPlugin<Dag>`.
pub struct PluginResolver<P: ?Sized> {
    constructors: BTreeMap<String, Box<dyn Fn() -> anyhow::Result<Box<P>> + Send + Sync>>,
}

impl<P: ?Sized> Default for PluginResolver<P> {
    fn default() -> Self {
        Self { constructors: BTreeMap::new() }
    }
}

impl<P: ?Sized> fmt::Debug for PluginResolver<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginResolver")
            .field("ids", &self.registered_ids())
            .finish()
    }
}

impl<P: ?Sized> PluginResolver<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor. A second registration for the same
    /// identifier replaces the first.
    pub fn register<F>(&mut self, id: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn() -> anyhow::Result<Box<P>> + Send + Sync + 'static,
    {
        self.constructors.insert(id.into(), Box::new(constructor));
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F>(mut self, id: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<P>> + Send + Sync + 'static,
    {
        self.register(id, constructor);
        self
    }

    pub fn registered_ids(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }

    /// Instantiate `ids` in order. Blank identifiers are skipped; an unknown
    /// identifier or a failing constructor fails the whole resolution.
    pub fn resolve_ids<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<Box<P>>> {
        let mut plugins = Vec::with_capacity(ids.len());
        for id in ids.iter().map(|id| id.as_ref().trim()).filter(|id| !id.is_empty()) {
            let constructor = self
                .constructors
                .get(id)
                .ok_or_else(|| PluginError::UnknownPlugin { id: id.to_string() })?;
            let plugin = constructor().map_err(|cause| PluginError::Instantiation {
                id: id.to_string(),
                cause,
            })?;
            debug!(id, position = plugins.len(), "[Plugins] Resolved");
            plugins.push(plugin);
        }
        Ok(plugins)
    }

    /// Instantiate the comma-separated identifier list stored under `key`.
    /// A missing key resolves to no plugins.
    pub fn resolve(&self, configuration: &Configuration, key: &str) -> Result<Vec<Box<P>>> {
        let ids = configuration.get_list(key);
        let plugins = self.resolve_ids(ids.as_slice())?;
        info!(key, count = plugins.len(), "[Plugins] Resolved configured plugins");
        Ok(plugins)
    }
}
