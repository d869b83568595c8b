//! Context handed to agents while they run inside their actor.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{Component, ComponentKind};
use crate::actor::{ActorCell, ActorRef, EntityKey};
use crate::error::ActorError;
use crate::event::{EventId, Payload};
use crate::messaging::{Outbound, OutboundFrame};
use crate::runtime::GameRuntime;
use crate::storage::StateCache;
use crate::timer::{TimerHandler, TimerId, TimerSpec};

/// Borrowed view of the running actor, scoped to one agent call.
///
/// Every agent hook, handler, listener and timer callback gets one. Nothing
/// reachable from it may be touched outside the actor's mailbox.
pub struct AgentContext<'a> {
    cell: &'a mut ActorCell,
    kind: ComponentKind,
}

impl<'a> AgentContext<'a> {
    pub(crate) fn new(cell: &'a mut ActorCell, kind: ComponentKind) -> Self {
        Self { cell, kind }
    }

    /// Key of the actor the agent belongs to.
    pub fn key(&self) -> EntityKey {
        self.cell.key()
    }

    /// Component the agent drives.
    pub fn component(&self) -> ComponentKind {
        self.kind
    }

    /// Mutable state of component `C` on this actor.
    pub fn state<C: Component>(&mut self) -> Result<&mut C::State, ActorError> {
        self.cell.state::<C>()
    }

    /// Agent of another component on this actor, attaching it if needed.
    ///
    /// Asking for the agent currently running returns
    /// [`ActorError::AgentBusy`].
    pub async fn agent<C: Component>(&mut self) -> Result<&mut C::Agent, ActorError> {
        self.cell.agent::<C>().await
    }

    /// State cache of this actor.
    pub fn cache(&mut self) -> &mut StateCache {
        self.cell.cache()
    }

    /// Handle to this actor's mailbox.
    pub fn actor(&self) -> Option<ActorRef> {
        self.cell.actor()
    }

    /// Handle to the runtime.
    pub fn runtime(&self) -> GameRuntime {
        self.cell.runtime()
    }

    /// The underlying actor cell.
    pub fn cell(&mut self) -> &mut ActorCell {
        self.cell
    }

    /// Whether the entity is marked online.
    pub fn is_online(&self) -> bool {
        self.cell.is_online()
    }

    /// Mark the entity online or offline.
    ///
    /// Online entities receive global event fan-out and are never evicted.
    pub fn set_online(&mut self, online: bool) {
        self.cell.set_online(online);
    }

    /// Dispatch an event originating from this actor.
    ///
    /// Listeners run later, as separate tasks; this never blocks the caller.
    pub fn dispatch_event(&self, id: EventId, payload: Payload) {
        self.cell.dispatch_event(id, payload);
    }

    /// Run timer handler `T` once after `delay`.
    pub fn delay<T: TimerHandler>(&mut self, delay: Duration, param: Payload) -> Result<TimerId, ActorError> {
        self.schedule_spec::<T>(TimerSpec::once(delay), param)
    }

    /// Run timer handler `T` after `delay`, then every `interval`.
    ///
    /// `repeat` bounds the number of fires; `None` repeats until
    /// unscheduled or the agent is deactivated.
    pub fn schedule<T: TimerHandler>(
        &mut self,
        delay: Duration,
        interval: Duration,
        repeat: Option<u32>,
        param: Payload,
    ) -> Result<TimerId, ActorError> {
        self.schedule_spec::<T>(TimerSpec::repeating(delay, interval, repeat), param)
    }

    fn schedule_spec<T: TimerHandler>(&mut self, spec: TimerSpec, param: Payload) -> Result<TimerId, ActorError> {
        let key = self.cell.key();
        let component = <T::Component as Component>::KIND;
        if <T::Component as Component>::ACTOR_KIND != key.kind {
            return Err(ActorError::NotBound {
                actor_kind: key.kind,
                component,
            });
        }
        let shared = self.cell.shared().clone();
        let id = shared
            .timers()
            .schedule(Arc::downgrade(&shared), key, T::name(), spec, param)?;
        self.cell.track_timer(id);
        debug!(actor = %key, %id, handler = T::name(), "timer scheduled");
        Ok(id)
    }

    /// Cancel a timer scheduled by this actor. Unknown ids are ignored.
    pub fn unschedule(&mut self, id: TimerId) -> bool {
        if !self.cell.untrack_timer(id) {
            return false;
        }
        self.cell.shared().timers().unschedule(id)
    }

    /// Cancel every timer scheduled by this actor.
    pub fn unschedule_all(&mut self) {
        self.cell.cancel_timers();
    }

    /// Push a message to the client bound to this entity.
    ///
    /// Returns `false` if no session is bound.
    pub fn notify_client(&self, message: Outbound) -> bool {
        self.cell
            .shared()
            .sessions()
            .notify(&self.cell.key(), OutboundFrame::push(message))
    }
}
