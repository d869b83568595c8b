//! Versioned bundle of everything a hotfix may replace.
//!
//! A [`HotfixModule`] holds the agent factories, message handlers, event
//! listeners and timer handlers. The runtime keeps the current module behind
//! an atomically swapped pointer; installing a new one submits a swap task to
//! every live actor, so a message enqueued before the swap runs against the
//! old agents and everything after against the new ones.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::registry::TypedBinding;
use super::{Component, ComponentKind, ErasedBinding};
use crate::error::ConfigError;
use crate::event::{EventListener, ListenerTable};
use crate::messaging::{Handler, HandlerRegistry};
use crate::timer::{TimerHandler, TimerHandlerTable};

/// Agent bindings, handlers, listeners and timer handlers of one code
/// version.
pub struct HotfixModule {
    name: String,
    version: u64,
    bindings: HashMap<ComponentKind, Arc<dyn ErasedBinding>>,
    handlers: HandlerRegistry,
    listeners: ListenerTable,
    timers: TimerHandlerTable,
}

impl HotfixModule {
    /// Start a module.
    pub fn builder(name: impl Into<String>) -> HotfixModuleBuilder {
        HotfixModuleBuilder {
            module: HotfixModule {
                name: name.into(),
                version: 0,
                bindings: HashMap::new(),
                handlers: HandlerRegistry::new(),
                listeners: ListenerTable::new(),
                timers: TimerHandlerTable::new(),
            },
            error: None,
        }
    }

    /// Module name, for logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version assigned when the module was installed. Starts at 1.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Name of the agent type bound to `kind`.
    pub fn agent_type(&self, kind: ComponentKind) -> Option<&'static str> {
        self.bindings.get(&kind).map(|binding| binding.agent_type())
    }

    /// Message handlers of this module.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Event listeners of this module.
    pub fn listeners(&self) -> &ListenerTable {
        &self.listeners
    }

    /// Timer handlers of this module.
    pub fn timers(&self) -> &TimerHandlerTable {
        &self.timers
    }

    pub(crate) fn binding(&self, kind: ComponentKind) -> Option<&Arc<dyn ErasedBinding>> {
        self.bindings.get(&kind)
    }

    pub(crate) fn bindings(&self) -> impl Iterator<Item = &Arc<dyn ErasedBinding>> {
        self.bindings.values()
    }
}

impl fmt::Debug for HotfixModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bound: Vec<_> = self.bindings.keys().collect();
        bound.sort_unstable();
        f.debug_struct("HotfixModule")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("bindings", &bound)
            .field("handlers", &self.handlers.handler_count())
            .field("listeners", &self.listeners.len())
            .field("timers", &self.timers.len())
            .finish()
    }
}

/// Builder for [`HotfixModule`]. Registration errors are kept and returned
/// by [`build`](Self::build).
///
/// ```rust,ignore
/// let module = HotfixModule::builder("v1")
///     .agent::<RoleComponent, _>("RoleAgent", || Box::new(RoleAgent::default()))
///     .handler(LoginHandler)
///     .listener(PetListener)
///     .timer(RoleTick)
///     .build()?;
/// ```
pub struct HotfixModuleBuilder {
    module: HotfixModule,
    error: Option<ConfigError>,
}

impl HotfixModuleBuilder {
    /// Bind an agent factory to component `C`.
    pub fn agent<C, F>(mut self, agent_type: &'static str, factory: F) -> Self
    where
        C: Component,
        F: Fn() -> Box<C::Agent> + Send + Sync + 'static,
    {
        if self.error.is_some() {
            return self;
        }
        if self.module.bindings.contains_key(&C::KIND) {
            self.error = Some(ConfigError::DuplicateBinding(C::KIND));
            return self;
        }
        let binding: Arc<dyn ErasedBinding> = Arc::new(TypedBinding::<C>::new(agent_type, factory));
        self.module.bindings.insert(C::KIND, binding);
        self
    }

    /// Register a message handler.
    pub fn handler<H: Handler>(mut self, handler: H) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.module.handlers.register(handler) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Register an event listener.
    pub fn listener<L: EventListener>(mut self, listener: L) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.module.listeners.register(listener) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Register a timer handler.
    pub fn timer<T: TimerHandler>(mut self, timer: T) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.module.timers.register(timer) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Finish the module.
    pub fn build(self) -> Result<HotfixModule, ConfigError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.module),
        }
    }
}
