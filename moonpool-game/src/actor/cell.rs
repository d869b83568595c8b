//! Per-actor data owned by the mailbox worker.

use std::any::Any;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::mailbox::ActorInner;
use super::{ActorRef, AgentPhase, DeactivationReason, EntityKey};
use crate::component::{AgentContext, Component, ComponentKind, ErasedBinding, HotfixModule};
use crate::error::{ActorError, StorageError};
use crate::event::{Event, EventId, Payload};
use crate::runtime::{GameRuntime, RuntimeShared};
use crate::storage::StateCache;
use crate::timer::TimerId;

/// One attached component: its agent and lifecycle phase.
struct AgentSlot {
    phase: AgentPhase,
    /// Holds a `Box<C::Agent>`. `None` while the agent is checked out.
    agent: Option<Box<dyn Any + Send>>,
    binding: Arc<dyn ErasedBinding>,
    version: u64,
}

impl AgentSlot {
    fn transition(&mut self, kind: ComponentKind, next: AgentPhase) -> Result<(), ActorError> {
        if !self.phase.can_transition_to(next) {
            warn!(component = %kind, from = ?self.phase, to = ?next, "invalid agent transition");
            return Err(ActorError::InvalidStateTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }
}

/// Everything an actor owns: attached agents, cached state, online flag and
/// timers.
///
/// Only reachable from tasks running in the actor's mailbox, which is what
/// makes mutation here race-free.
pub struct ActorCell {
    key: EntityKey,
    incarnation: u64,
    handle: Weak<ActorInner>,
    shared: Arc<RuntimeShared>,
    /// Module this actor runs. Only replaced by a hotfix task in the
    /// mailbox, so work queued before the swap sees the old tables.
    module: Arc<HotfixModule>,
    slots: HashMap<ComponentKind, AgentSlot>,
    cache: StateCache,
    online: bool,
    timers: HashSet<TimerId>,
    roster: BTreeSet<EntityKey>,
    last_active: Instant,
    retired: bool,
}

impl ActorCell {
    pub(crate) fn new(
        key: EntityKey,
        incarnation: u64,
        handle: Weak<ActorInner>,
        shared: Arc<RuntimeShared>,
    ) -> Self {
        let cache = StateCache::new(shared.store(), shared.cache_backend());
        let module = shared.module();
        Self {
            key,
            incarnation,
            handle,
            shared,
            module,
            slots: HashMap::new(),
            cache,
            online: false,
            timers: HashSet::new(),
            roster: BTreeSet::new(),
            last_active: Instant::now(),
            retired: false,
        }
    }

    /// Key of this actor.
    pub fn key(&self) -> EntityKey {
        self.key
    }

    /// Handle to this actor's mailbox, while it is alive.
    pub fn actor(&self) -> Option<ActorRef> {
        self.handle.upgrade().map(ActorRef::from_inner)
    }

    /// Handle to the runtime.
    pub fn runtime(&self) -> GameRuntime {
        GameRuntime::from_shared(self.shared.clone())
    }

    pub(crate) fn shared(&self) -> &Arc<RuntimeShared> {
        &self.shared
    }

    /// Version of the module this actor's agents are built from.
    pub fn module_version(&self) -> u64 {
        self.module.version()
    }

    /// Whether the entity is marked online.
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// This actor's state cache.
    pub fn cache(&mut self) -> &mut StateCache {
        &mut self.cache
    }

    /// Components with an active agent, sorted by name.
    pub fn attached(&self) -> Vec<ComponentKind> {
        let mut kinds: Vec<ComponentKind> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.phase.can_serve())
            .map(|(kind, _)| *kind)
            .collect();
        kinds.sort_unstable();
        kinds
    }

    /// Lifecycle phase of a component's agent.
    ///
    /// `Detached` is only held for the moment the slot is dropped; afterwards
    /// the component reports `Unattached`.
    pub fn phase(&self, kind: ComponentKind) -> AgentPhase {
        self.slots
            .get(&kind)
            .map_or(AgentPhase::Unattached, |slot| slot.phase)
    }

    /// Entities currently online. Only maintained on the coordinating
    /// server actor.
    pub fn online_roster(&self) -> &BTreeSet<EntityKey> {
        &self.roster
    }

    /// Number of timers scheduled through this actor's agents.
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Mutable state of an attached component.
    pub fn state<C: Component>(&mut self) -> Result<&mut C::State, ActorError> {
        self.check_bound::<C>()?;
        self.cache
            .cached_mut::<C::State>(self.key.id)
            .ok_or(ActorError::NotAttached(C::KIND))
    }

    /// Get the agent of component `C`, attaching it first if needed.
    ///
    /// Attaching loads or creates the state, builds the agent from this
    /// actor's module and runs its `active()` hook exactly once.
    pub async fn agent<C: Component>(&mut self) -> Result<&mut C::Agent, ActorError> {
        self.check_bound::<C>()?;
        self.ensure_attached(C::KIND).await?;
        let slot = self
            .slots
            .get_mut(&C::KIND)
            .ok_or(ActorError::NotAttached(C::KIND))?;
        let agent = slot.agent.as_mut().ok_or(ActorError::AgentBusy(C::KIND))?;
        downcast_agent::<C>(agent)
    }

    /// Run `f` with the agent of component `C` and a context for it.
    ///
    /// The closure must own what it captures.
    ///
    /// ```rust,ignore
    /// actor.send(|cell| async move {
    ///     cell.with_agent::<RoleComponent, _, _>(|agent, ctx| agent.level_up(ctx).boxed()).await
    /// }.boxed()).await?;
    /// ```
    pub async fn with_agent<C, F, R>(&mut self, f: F) -> Result<R, ActorError>
    where
        C: Component,
        F: for<'x> FnOnce(&'x mut C::Agent, &'x mut AgentContext<'x>) -> BoxFuture<'x, Result<R, ActorError>>
            + Send,
    {
        let mut agent = self.checkout::<C>().await?;
        let result = {
            let mut ctx = AgentContext::new(self, C::KIND);
            f(&mut *agent, &mut ctx).await
        };
        self.checkin::<C>(agent);
        result
    }

    /// Take the agent of `C` out of its slot for the duration of a call.
    pub(crate) async fn checkout<C: Component>(&mut self) -> Result<Box<C::Agent>, ActorError> {
        self.check_bound::<C>()?;
        self.ensure_attached(C::KIND).await?;
        let slot = self
            .slots
            .get_mut(&C::KIND)
            .ok_or(ActorError::NotAttached(C::KIND))?;
        let agent = slot.agent.take().ok_or(ActorError::AgentBusy(C::KIND))?;
        match agent.downcast::<Box<C::Agent>>() {
            Ok(agent) => Ok(*agent),
            Err(agent) => {
                slot.agent = Some(agent);
                Err(ActorError::AgentTypeMismatch(C::KIND))
            }
        }
    }

    /// Put a checked out agent back.
    pub(crate) fn checkin<C: Component>(&mut self, agent: Box<C::Agent>) {
        match self.slots.get_mut(&C::KIND) {
            Some(slot) => slot.agent = Some(Box::new(agent)),
            None => debug!(actor = %self.key, component = %C::KIND, "agent detached while checked out"),
        }
    }

    /// Attach the agent of `kind` if it is not attached yet.
    pub async fn activate(&mut self, kind: ComponentKind) -> Result<(), ActorError> {
        self.ensure_attached(kind).await
    }

    /// Attach every component declared for this actor's kind.
    pub(crate) async fn activate_declared(&mut self) -> Result<(), ActorError> {
        let kinds = self.shared.components().components_of(self.key.kind).to_vec();
        for kind in kinds {
            self.ensure_attached(kind).await?;
        }
        Ok(())
    }

    /// Run the agent's `inactive()` hook and detach it.
    ///
    /// The component's state stays cached until flushed.
    pub async fn deactivate(&mut self, kind: ComponentKind) -> Result<(), ActorError> {
        let (binding, mut agent) = match self.slots.get_mut(&kind) {
            Some(slot) => {
                slot.transition(kind, AgentPhase::Deactivating)?;
                (slot.binding.clone(), slot.agent.take())
            }
            None => return Ok(()),
        };

        let result = match agent.as_mut() {
            Some(agent) => {
                let mut ctx = AgentContext::new(self, kind);
                binding.inactive(agent, &mut ctx).await
            }
            None => Ok(()),
        };

        self.detach(kind)?;
        result
    }

    /// Move the slot to `Detached` and drop it. A detached component reads
    /// as `Unattached` again, ready for a fresh agent.
    fn detach(&mut self, kind: ComponentKind) -> Result<(), ActorError> {
        if let Some(mut slot) = self.slots.remove(&kind) {
            slot.transition(kind, AgentPhase::Detached)?;
            debug!(actor = %self.key, component = %kind, phase = ?slot.phase, "agent detached");
        }
        Ok(())
    }

    /// Deactivate every agent, then cancel the actor's remaining timers.
    pub(crate) async fn deactivate_all(&mut self) -> Result<(), ActorError> {
        let mut kinds: Vec<ComponentKind> = self.slots.keys().copied().collect();
        kinds.sort_unstable();

        let mut first_error = None;
        for kind in kinds {
            if let Err(e) = self.deactivate(kind).await {
                warn!(actor = %self.key, component = %kind, error = %e, "inactive hook failed");
                first_error.get_or_insert(e);
            }
        }
        self.cancel_timers();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Persist every dirty state of this actor.
    pub async fn flush(&mut self) -> Result<usize, StorageError> {
        self.cache.flush().await
    }

    /// Deactivate, flush and, for evicting reasons, retire the actor.
    ///
    /// Returns the number of records written, or `None` when dirty state
    /// could not be persisted; the actor then stays registered and eviction
    /// is retried later.
    pub(crate) async fn shut_down(&mut self, reason: DeactivationReason) -> Result<Option<usize>, ActorError> {
        if let Err(e) = self.deactivate_all().await {
            warn!(actor = %self.key, ?reason, error = %e, "deactivation incomplete");
        }

        let written = match self.cache.flush().await {
            Ok(written) => written,
            Err(e) => {
                warn!(actor = %self.key, ?reason, error = %e, "flush failed, keeping actor");
                return Ok(None);
            }
        };
        if self.cache.has_dirty()? {
            return Ok(None);
        }

        if reason.evicts() {
            self.cache.clear();
            self.shared.actors().remove_incarnation(&self.key, self.incarnation);
            self.retired = true;
            info!(actor = %self.key, ?reason, "actor evicted");
        }
        Ok(Some(written))
    }

    /// Switch to `module` and replace agents built from an older one.
    ///
    /// State is untouched and the old agents get no `inactive()` call. A
    /// module older than the current one is ignored.
    pub(crate) async fn apply_hotfix(&mut self, module: Arc<HotfixModule>) -> Result<(), ActorError> {
        if module.version() <= self.module.version() {
            return Ok(());
        }
        self.module = module.clone();
        let mut stale: Vec<ComponentKind> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.version != module.version() && slot.phase.can_serve())
            .map(|(kind, _)| *kind)
            .collect();
        stale.sort_unstable();

        for kind in stale {
            let Some(binding) = module.binding(kind).cloned() else {
                warn!(actor = %self.key, component = %kind, "no binding in new module");
                continue;
            };
            if let Some(slot) = self.slots.get_mut(&kind) {
                slot.agent = None;
                slot.binding = binding.clone();
                slot.version = module.version();
            }
            self.install_replacement(kind, binding).await;
            debug!(actor = %self.key, component = %kind, version = module.version(), "agent swapped");
        }
        Ok(())
    }

    /// Rebuild agents lost to a panicking task.
    pub(crate) async fn repair(&mut self) {
        let mut lost: Vec<(ComponentKind, AgentPhase)> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.agent.is_none())
            .map(|(kind, slot)| (*kind, slot.phase))
            .collect();
        lost.sort_unstable_by_key(|(kind, _)| *kind);

        for (kind, phase) in lost {
            if phase != AgentPhase::Active {
                self.slots.remove(&kind);
                continue;
            }
            let Some(binding) = self.module.binding(kind).cloned() else {
                self.slots.remove(&kind);
                continue;
            };
            let version = self.module.version();
            if let Some(slot) = self.slots.get_mut(&kind) {
                slot.binding = binding.clone();
                slot.version = version;
            }
            warn!(actor = %self.key, component = %kind, "rebuilding agent after panic");
            self.install_replacement(kind, binding).await;
        }
    }

    async fn install_replacement(&mut self, kind: ComponentKind, binding: Arc<dyn ErasedBinding>) {
        let mut agent = binding.create_agent();
        let result = {
            let mut ctx = AgentContext::new(self, kind);
            binding.reload(&mut agent, &mut ctx).await
        };
        if let Err(e) = result {
            warn!(actor = %self.key, component = %kind, error = %e, "reload hook failed");
        }
        if let Some(slot) = self.slots.get_mut(&kind) {
            slot.agent = Some(agent);
        }
    }

    /// Run the day rollover hook on every active agent.
    pub(crate) async fn cross_day(&mut self, open_day: u32) -> Result<(), ActorError> {
        for kind in self.attached() {
            let Some(slot) = self.slots.get_mut(&kind) else {
                continue;
            };
            let binding = slot.binding.clone();
            let Some(mut agent) = slot.agent.take() else {
                continue;
            };
            let result = {
                let mut ctx = AgentContext::new(self, kind);
                binding.cross_day(&mut agent, &mut ctx, open_day).await
            };
            if let Some(slot) = self.slots.get_mut(&kind) {
                slot.agent = Some(agent);
            }
            if let Err(e) = result {
                warn!(actor = %self.key, component = %kind, open_day, error = %e, "cross day failed");
            }
        }
        Ok(())
    }

    /// Deliver an event to this actor's listeners, in registration order.
    ///
    /// A failing listener is logged and does not stop the others.
    pub(crate) async fn deliver_event(&mut self, event: &Event) {
        let module = self.module.clone();
        let listeners = module.listeners().find(self.key.kind, event.id);
        if listeners.is_empty() {
            debug!(actor = %self.key, event = %event.id, "no listener");
            return;
        }
        for listener in listeners {
            if let Err(e) = listener.invoke(self, event).await {
                warn!(
                    actor = %self.key,
                    event = %event.id,
                    listener = listener.name(),
                    error = %e,
                    "listener failed"
                );
            }
        }
    }

    /// Run a timer handler looked up by name in this actor's module.
    pub(crate) async fn fire_timer(
        &mut self,
        id: TimerId,
        handler: &'static str,
        param: &Payload,
        last: bool,
    ) -> Result<(), ActorError> {
        if last {
            self.timers.remove(&id);
        }
        let module = self.module.clone();
        let Some(timer) = module.timers().get(handler) else {
            warn!(actor = %self.key, %id, handler, "timer handler not registered");
            return Ok(());
        };
        timer.invoke(self, param).await
    }

    /// Dispatch an event originating from this actor.
    pub fn dispatch_event(&self, id: EventId, payload: Payload) {
        self.shared.dispatch_event(self.key, id, payload);
    }

    /// Mark the entity online or offline.
    ///
    /// Online entities receive global event fan-out and are never evicted.
    pub fn set_online(&mut self, online: bool) {
        if self.online == online {
            return;
        }
        self.online = online;
        self.shared.update_roster(self.key, online);
    }

    pub(crate) fn roster_mut(&mut self) -> &mut BTreeSet<EntityKey> {
        &mut self.roster
    }

    pub(crate) fn track_timer(&mut self, id: TimerId) {
        self.timers.insert(id);
    }

    pub(crate) fn untrack_timer(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id)
    }

    pub(crate) fn cancel_timers(&mut self) {
        if self.timers.is_empty() {
            return;
        }
        debug!(actor = %self.key, count = self.timers.len(), "cancelling timers");
        for id in self.timers.drain() {
            self.shared.timers().unschedule(id);
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired
    }

    fn check_bound<C: Component>(&self) -> Result<(), ActorError> {
        if C::ACTOR_KIND == self.key.kind {
            Ok(())
        } else {
            Err(ActorError::NotBound {
                actor_kind: self.key.kind,
                component: C::KIND,
            })
        }
    }

    async fn ensure_attached(&mut self, kind: ComponentKind) -> Result<(), ActorError> {
        if let Some(slot) = self.slots.get(&kind) {
            return match slot.phase {
                AgentPhase::Active if slot.agent.is_some() => Ok(()),
                _ => Err(ActorError::AgentBusy(kind)),
            };
        }

        let module = self.module.clone();
        let binding = self.shared.resolve_binding(&module, self.key.kind, kind)?;
        binding.load_state(&mut self.cache, self.key.id).await?;

        let mut slot = AgentSlot {
            phase: AgentPhase::Unattached,
            agent: None,
            binding: binding.clone(),
            version: module.version(),
        };
        slot.transition(kind, AgentPhase::Activating)?;
        self.slots.insert(kind, slot);

        debug!(actor = %self.key, component = %kind, agent = binding.agent_type(), "activating agent");
        let mut agent = binding.create_agent();
        let result = {
            let mut ctx = AgentContext::new(self, kind);
            binding.active(&mut agent, &mut ctx).await
        };

        match result {
            Ok(()) => {
                let slot = self
                    .slots
                    .get_mut(&kind)
                    .ok_or(ActorError::NotAttached(kind))?;
                slot.transition(kind, AgentPhase::Active)?;
                slot.agent = Some(agent);
                Ok(())
            }
            Err(e) => {
                self.detach(kind)?;
                warn!(actor = %self.key, component = %kind, error = %e, "agent activation failed");
                Err(ActorError::ActivationFailed {
                    kind,
                    reason: e.to_string(),
                })
            }
        }
    }
}

impl fmt::Debug for ActorCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorCell")
            .field("key", &self.key)
            .field("attached", &self.attached())
            .field("online", &self.online)
            .field("timers", &self.timers.len())
            .finish()
    }
}

pub(crate) fn downcast_agent<C: Component>(
    agent: &mut Box<dyn Any + Send>,
) -> Result<&mut C::Agent, ActorError> {
    (**agent)
        .downcast_mut::<Box<C::Agent>>()
        .map(|agent| &mut **agent)
        .ok_or(ActorError::AgentTypeMismatch(C::KIND))
}
