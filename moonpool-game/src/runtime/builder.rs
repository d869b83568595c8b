//! Builder for [`GameRuntime`].

use std::sync::Arc;

use tracing::info;

use super::game_runtime::GameRuntime;
use super::shared::RuntimeShared;
use crate::component::{Component, ComponentRegistryBuilder, HotfixModule};
use crate::config::RuntimeConfig;
use crate::error::ConfigError;
use crate::storage::{CacheBackend, PersistenceAdapter};

/// Collects the parts of a [`GameRuntime`] and checks them together.
///
/// A store and a module are required. The configuration defaults to
/// [`RuntimeConfig::default`]; the shared cache backend is optional.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    components: ComponentRegistryBuilder,
    module: Option<HotfixModule>,
    store: Option<Arc<dyn PersistenceAdapter>>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
}

impl RuntimeBuilder {
    pub(crate) fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            components: ComponentRegistryBuilder::default(),
            module: None,
            store: None,
            cache_backend: None,
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Declare component `C`.
    pub fn component<C: Component>(mut self) -> Self {
        self.components = self.components.declare::<C>();
        self
    }

    /// Set the initial module.
    pub fn module(mut self, module: HotfixModule) -> Self {
        self.module = Some(module);
        self
    }

    /// Set the persistence adapter.
    pub fn store(mut self, store: Arc<dyn PersistenceAdapter>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the shared cache consulted before the store.
    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    /// Build the runtime. Nothing runs until [`GameRuntime::start`].
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration, a missing store or
    /// module, duplicate declarations, or a module that does not match the
    /// declared components.
    pub fn build(self) -> Result<GameRuntime, ConfigError> {
        self.config.validate()?;
        let components = self.components.build()?;
        let store = self.store.ok_or(ConfigError::Missing("store"))?;
        let module = self.module.ok_or(ConfigError::Missing("module"))?;
        components.validate(&module)?;

        info!(
            server_id = self.config.server_id,
            components = components.len(),
            module = module.name(),
            "game runtime built"
        );
        let shared = RuntimeShared::new(self.config, components, module, store, self.cache_backend);
        Ok(GameRuntime::from_shared(Arc::new(shared)))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
