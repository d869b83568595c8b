//! Timer callbacks, looked up by name when a timer fires.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::actor::ActorCell;
use crate::component::{AgentContext, Component, ComponentKind};
use crate::error::{ActorError, ConfigError};
use crate::event::Payload;

/// Callback of a timer scheduled by an agent.
///
/// Timers reference their handler by name, so a hotfix that registers a new
/// handler type under the same name changes what already scheduled timers
/// run on their next fire.
#[async_trait]
pub trait TimerHandler: Send + Sync + 'static {
    /// Component whose agent the callback runs on.
    type Component: Component;

    /// Name the timer is scheduled under.
    fn name() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }

    /// Handle one fire, with the parameter captured at scheduling time.
    async fn on_timer(
        &self,
        agent: &mut <Self::Component as Component>::Agent,
        ctx: &mut AgentContext<'_>,
        param: &Payload,
    ) -> Result<(), ActorError>;
}

#[async_trait]
pub(crate) trait ErasedTimer: Send + Sync {
    fn name(&self) -> &'static str;

    fn component(&self) -> ComponentKind;

    async fn invoke(&self, cell: &mut ActorCell, param: &Payload) -> Result<(), ActorError>;
}

struct TypedTimer<T: TimerHandler> {
    handler: T,
}

#[async_trait]
impl<T: TimerHandler> ErasedTimer for TypedTimer<T> {
    fn name(&self) -> &'static str {
        T::name()
    }

    fn component(&self) -> ComponentKind {
        <T::Component as Component>::KIND
    }

    async fn invoke(&self, cell: &mut ActorCell, param: &Payload) -> Result<(), ActorError> {
        let mut agent = cell.checkout::<T::Component>().await?;
        let result = {
            let mut ctx = AgentContext::new(cell, self.component());
            self.handler.on_timer(&mut *agent, &mut ctx, param).await
        };
        cell.checkin::<T::Component>(agent);
        result
    }
}

/// Timer handlers by name.
#[derive(Default)]
pub struct TimerHandlerTable {
    handlers: BTreeMap<&'static str, Arc<dyn ErasedTimer>>,
}

impl TimerHandlerTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under [`TimerHandler::name`].
    pub fn register<T: TimerHandler>(&mut self, handler: T) -> Result<(), ConfigError> {
        let name = T::name();
        if self.handlers.contains_key(name) {
            return Err(ConfigError::DuplicateTimerHandler(name));
        }
        self.handlers.insert(name, Arc::new(TypedTimer { handler }));
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Arc<dyn ErasedTimer>> {
        self.handlers.get(name)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<dyn ErasedTimer>> {
        self.handlers.values()
    }

    /// Returns `true` if a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
