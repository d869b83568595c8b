//! Event listeners and the `(actor kind, event id)` lookup table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Event, EventId};
use crate::actor::{ActorCell, ActorKind};
use crate::component::{AgentContext, Component, ComponentKind};
use crate::error::{ActorError, ConfigError};

/// Reacts to events on the agent of one component.
///
/// The listener is registered for its component's actor kind and every id in
/// [`EVENTS`](Self::EVENTS).
#[async_trait]
pub trait EventListener: Send + Sync + 'static {
    /// Component whose agent receives the event.
    type Component: Component;

    /// Event ids the listener subscribes to.
    const EVENTS: &'static [EventId];

    /// Handle one event inside the actor's mailbox.
    async fn on_event(
        &self,
        agent: &mut <Self::Component as Component>::Agent,
        ctx: &mut AgentContext<'_>,
        event: &Event,
    ) -> Result<(), ActorError>;
}

#[async_trait]
pub(crate) trait ErasedListener: Send + Sync {
    fn name(&self) -> &'static str;

    fn component(&self) -> ComponentKind;

    async fn invoke(&self, cell: &mut ActorCell, event: &Event) -> Result<(), ActorError>;
}

struct TypedListener<L: EventListener> {
    listener: L,
}

#[async_trait]
impl<L: EventListener> ErasedListener for TypedListener<L> {
    fn name(&self) -> &'static str {
        std::any::type_name::<L>()
    }

    fn component(&self) -> ComponentKind {
        <L::Component as Component>::KIND
    }

    async fn invoke(&self, cell: &mut ActorCell, event: &Event) -> Result<(), ActorError> {
        let mut agent = cell.checkout::<L::Component>().await?;
        let result = {
            let mut ctx = AgentContext::new(cell, self.component());
            self.listener.on_event(&mut *agent, &mut ctx, event).await
        };
        cell.checkin::<L::Component>(agent);
        result
    }
}

/// Listeners by `(actor kind, event id)`, in registration order.
#[derive(Default)]
pub struct ListenerTable {
    by_event: HashMap<(ActorKind, EventId), Vec<Arc<dyn ErasedListener>>>,
    all: Vec<Arc<dyn ErasedListener>>,
}

impl ListenerTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for each of its events.
    pub fn register<L: EventListener>(&mut self, listener: L) -> Result<(), ConfigError> {
        let typed: Arc<dyn ErasedListener> = Arc::new(TypedListener { listener });
        let actor_kind = <L::Component as Component>::ACTOR_KIND;

        for event in L::EVENTS {
            let registered = self.by_event.get(&(actor_kind, *event));
            if registered.is_some_and(|list| list.iter().any(|l| l.name() == typed.name())) {
                return Err(ConfigError::DuplicateListener {
                    listener: typed.name(),
                    event: *event,
                });
            }
        }
        for event in L::EVENTS {
            self.by_event
                .entry((actor_kind, *event))
                .or_default()
                .push(typed.clone());
        }
        self.all.push(typed);
        Ok(())
    }

    pub(crate) fn find(&self, actor_kind: ActorKind, event: EventId) -> &[Arc<dyn ErasedListener>] {
        self.by_event
            .get(&(actor_kind, event))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<dyn ErasedListener>> {
        self.all.iter()
    }

    /// Returns `true` if any listener of `actor_kind` subscribes to `event`.
    pub fn has_listener(&self, actor_kind: ActorKind, event: EventId) -> bool {
        !self.find(actor_kind, event).is_empty()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// Returns `true` if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::component::Agent;
    use crate::storage::State;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct PetState;

    impl State for PetState {
        const TYPE_NAME: &'static str = "PetState";
    }

    struct PetAgent;

    impl Agent for PetAgent {}

    struct PetComponent;

    impl Component for PetComponent {
        const KIND: ComponentKind = ComponentKind::new("pet");
        const ACTOR_KIND: ActorKind = ActorKind::Role;
        type State = PetState;
        type Agent = PetAgent;
    }

    struct NewPetListener;

    #[async_trait]
    impl EventListener for NewPetListener {
        type Component = PetComponent;
        const EVENTS: &'static [EventId] = &[EventId(101), EventId(102)];

        async fn on_event(&self, _: &mut PetAgent, _: &mut AgentContext<'_>, _: &Event) -> Result<(), ActorError> {
            Ok(())
        }
    }

    #[test]
    fn test_listener_indexed_per_event() {
        let mut table = ListenerTable::new();
        table.register(NewPetListener).expect("register");

        assert_eq!(table.len(), 1);
        assert!(table.has_listener(ActorKind::Role, EventId(101)));
        assert!(table.has_listener(ActorKind::Role, EventId(102)));
        assert!(!table.has_listener(ActorKind::Guild, EventId(101)));
        assert!(table.find(ActorKind::Role, EventId(103)).is_empty());
    }

    #[test]
    fn test_duplicate_listener_rejected() {
        let mut table = ListenerTable::new();
        table.register(NewPetListener).expect("first");
        let err = table.register(NewPetListener).expect_err("second");
        assert!(matches!(err, ConfigError::DuplicateListener { event: EventId(101), .. }));
        assert_eq!(table.len(), 1);
    }
}
