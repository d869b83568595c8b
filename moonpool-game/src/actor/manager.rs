//! Registry of live actors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::{ActorRef, EntityKey};
use crate::runtime::RuntimeShared;

/// Maps entity keys to their live actor.
///
/// At most one actor exists per key. Creation races are settled by the map's
/// entry lock: the loser gets the winner's handle.
#[derive(Debug, Default)]
pub struct ActorManager {
    actors: DashMap<EntityKey, ActorRef>,
    next_incarnation: AtomicU64,
}

impl ActorManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Live actor for `key`, if any.
    pub fn get(&self, key: &EntityKey) -> Option<ActorRef> {
        self.actors
            .get(key)
            .map(|entry| entry.value().clone())
            .filter(|actor| !actor.is_closed())
    }

    /// Returns `true` if an actor is live for `key`.
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.get(key).is_some()
    }

    /// Live actor for `key`, spawning it on first access.
    pub(crate) fn get_or_create(&self, shared: &Arc<RuntimeShared>, key: EntityKey) -> ActorRef {
        if let Some(actor) = self.get(&key) {
            return actor;
        }

        match self.actors.entry(key) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_closed() {
                    let actor = self.spawn(shared, key);
                    entry.insert(actor.clone());
                    actor
                } else {
                    entry.get().clone()
                }
            }
            Entry::Vacant(entry) => {
                let actor = self.spawn(shared, key);
                entry.insert(actor.clone());
                actor
            }
        }
    }

    fn spawn(&self, shared: &Arc<RuntimeShared>, key: EntityKey) -> ActorRef {
        let incarnation = self.next_incarnation.fetch_add(1, Ordering::Relaxed);
        debug!(actor = %key, incarnation, "spawning actor");
        ActorRef::spawn(shared, key, incarnation)
    }

    /// Remove `key` only if it still maps to `incarnation`.
    ///
    /// An evicted actor must not unregister the actor that replaced it.
    pub(crate) fn remove_incarnation(&self, key: &EntityKey, incarnation: u64) -> bool {
        self.actors
            .remove_if(key, |_, actor| actor.incarnation() == incarnation)
            .is_some()
    }

    /// Handles to every live actor.
    pub fn snapshot(&self) -> Vec<ActorRef> {
        self.actors
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|actor| !actor.is_closed())
            .collect()
    }

    /// Keys of every live actor.
    pub fn keys(&self) -> Vec<EntityKey> {
        self.snapshot().iter().map(ActorRef::key).collect()
    }

    /// Number of registered actors.
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Returns `true` if no actor is registered.
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Unregister every actor. Mailboxes stop once the last handle drops.
    pub(crate) fn drain(&self) -> Vec<ActorRef> {
        let keys: Vec<EntityKey> = self.actors.iter().map(|entry| *entry.key()).collect();
        keys.iter()
            .filter_map(|key| self.actors.remove(key).map(|(_, actor)| actor))
            .collect()
    }
}
