//! Broker Registry
//!
//! Maps broker names to adapter constructors. Holds no session state; one
//! instance lives at the process root and is passed around explicitly.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::application::ports::BrokerAdapter;
pub use crate::domain::session::RegistryError;

/// Constructor producing a fresh adapter per session.
pub type BrokerFactory = Arc<dyn Fn() -> Box<dyn BrokerAdapter> + Send + Sync>;

/// Registry entry.
#[derive(Clone)]
pub struct BrokerPlugin {
    /// Unique broker name.
    pub name: String,
    /// Plugin version.
    pub version: String,
    /// Names of plugins that must be registered first.
    pub dependencies: Vec<String>,
    factory: BrokerFactory,
}

impl BrokerPlugin {
    /// Create a plugin.
    pub fn new<F>(name: impl Into<String>, version: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn BrokerAdapter> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            version: version.into(),
            dependencies: Vec::new(),
            factory: Arc::new(factory),
        }
    }

    /// Declare dependencies.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Build a fresh adapter.
    #[must_use]
    pub fn create_instance(&self) -> Box<dyn BrokerAdapter> {
        (self.factory)()
    }
}

impl fmt::Debug for BrokerPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerPlugin")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Plugin metadata returned by lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    /// Unique broker name.
    pub name: String,
    /// Plugin version.
    pub version: String,
    /// Declared dependencies.
    pub dependencies: Vec<String>,
}

/// Broker registry.
#[derive(Debug, Default)]
pub struct BrokerRegistry {
    plugins: RwLock<HashMap<String, BrokerPlugin>>,
}

impl BrokerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin.
    ///
    /// # Errors
    ///
    /// Returns `DuplicatePlugin` if the name is taken and `MissingDependency`
    /// if a declared dependency is not registered.
    pub fn register_plugin(&self, plugin: BrokerPlugin) -> Result<(), RegistryError> {
        let mut plugins = self.plugins.write();
        if plugins.contains_key(&plugin.name) {
            return Err(RegistryError::DuplicatePlugin { name: plugin.name });
        }
        if let Some(missing) = plugin
            .dependencies
            .iter()
            .find(|dep| !plugins.contains_key(*dep))
        {
            return Err(RegistryError::MissingDependency {
                name: plugin.name.clone(),
                dependency: missing.clone(),
            });
        }

        tracing::info!(
            broker = %plugin.name,
            version = %plugin.version,
            "Registered broker plugin"
        );
        plugins.insert(plugin.name.clone(), plugin);
        Ok(())
    }

    /// Unregister a plugin.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown names and `InUse` while other plugins
    /// depend on it.
    pub fn unregister_plugin(&self, name: &str) -> Result<(), RegistryError> {
        let mut plugins = self.plugins.write();
        if !plugins.contains_key(name) {
            return Err(RegistryError::NotFound {
                name: name.to_string(),
            });
        }

        let mut dependents: Vec<String> = plugins
            .values()
            .filter(|p| p.dependencies.iter().any(|d| d == name))
            .map(|p| p.name.clone())
            .collect();
        if !dependents.is_empty() {
            dependents.sort();
            return Err(RegistryError::InUse {
                name: name.to_string(),
                dependents,
            });
        }

        plugins.remove(name);
        tracing::info!(broker = %name, "Unregistered broker plugin");
        Ok(())
    }

    /// Instantiate a fresh adapter for `name`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown names.
    pub fn create_broker(&self, name: &str) -> Result<Box<dyn BrokerAdapter>, RegistryError> {
        let plugins = self.plugins.read();
        plugins
            .get(name)
            .map(BrokerPlugin::create_instance)
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    /// Names of registered plugins.
    #[must_use]
    pub fn list_available(&self) -> BTreeSet<String> {
        self.plugins.read().keys().cloned().collect()
    }

    /// Metadata for one plugin.
    #[must_use]
    pub fn plugin(&self, name: &str) -> Option<PluginInfo> {
        self.plugins.read().get(name).map(|p| PluginInfo {
            name: p.name.clone(),
            version: p.version.clone(),
            dependencies: p.dependencies.clone(),
        })
    }
}
