//! Event delivery: self-handling on the origin, then optional broadcast.

use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, warn};

use super::{Event, EventId, Payload};
use crate::actor::{ActorKind, EntityKey};
use crate::runtime::RuntimeShared;

/// Delivers events to listeners through actor mailboxes.
///
/// # Ordering
///
/// ```text
/// dispatch ─▶ origin mailbox: origin listeners ─▶ coordinator mailbox: roster scan
///                                                     ├─▶ online actor A: listeners
///                                                     └─▶ online actor B: listeners
/// ```
///
/// The broadcast task is only enqueued once the origin's listeners have
/// finished. Delivery order between broadcast targets is unspecified.
#[derive(Clone)]
pub struct EventDispatcher {
    shared: Arc<RuntimeShared>,
}

impl EventDispatcher {
    pub(crate) fn new(shared: Arc<RuntimeShared>) -> Self {
        Self { shared }
    }

    /// Returns `true` if events with `id` raised on an actor of
    /// `origin_kind` are broadcast to online entities.
    ///
    /// Only server-wide ids raised by global actors fan out. Entity-scoped
    /// ids never do.
    pub fn broadcasts(id: EventId, origin_kind: ActorKind) -> bool {
        id.is_global() && origin_kind.is_global()
    }

    /// Dispatch event `id` raised by `origin`.
    ///
    /// Does nothing if `origin` has no live actor.
    pub fn dispatch(&self, origin: EntityKey, id: EventId, payload: Payload) {
        let Some(actor) = self.shared.actors().get(&origin) else {
            debug!(actor = %origin, event = %id, "event origin not live, dropped");
            return;
        };

        let event = Arc::new(Event { id, origin, payload });
        let broadcast = Self::broadcasts(id, origin.kind).then(|| self.clone());
        let posted = actor.post(format!("event {id}").into(), true, move |cell| {
            async move {
                cell.deliver_event(&event).await;
                if let Some(dispatcher) = broadcast {
                    dispatcher.broadcast(event);
                }
                Ok(())
            }
            .boxed()
        });
        if let Err(e) = posted {
            warn!(actor = %origin, event = %id, error = %e, "event not delivered");
        }
    }

    fn broadcast(&self, event: Arc<Event>) {
        let shared = self.shared.clone();
        let id = event.id;
        let coordinator = self.shared.coordinator();
        let posted = coordinator.post(format!("broadcast {id}").into(), false, move |cell| {
            async move {
                let targets: Vec<EntityKey> = cell
                    .online_roster()
                    .iter()
                    .copied()
                    .filter(|key| *key != event.origin)
                    .collect();
                debug!(event = %event.id, targets = targets.len(), "broadcasting event");

                for key in targets {
                    let Some(actor) = shared.actors().get(&key) else {
                        continue;
                    };
                    let event = event.clone();
                    let posted = actor.post(format!("event {}", event.id).into(), false, move |cell| {
                        async move {
                            cell.deliver_event(&event).await;
                            Ok(())
                        }
                        .boxed()
                    });
                    if let Err(e) = posted {
                        debug!(actor = %key, error = %e, "broadcast target gone");
                    }
                }
                Ok(())
            }
            .boxed()
        });
        if let Err(e) = posted {
            warn!(event = %id, error = %e, "broadcast not scheduled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_rule() {
        let world_level_up = EventId(1001);
        let got_new_pet = EventId(101);

        assert!(EventDispatcher::broadcasts(world_level_up, ActorKind::Server));
        assert!(!EventDispatcher::broadcasts(world_level_up, ActorKind::Role));
        assert!(!EventDispatcher::broadcasts(got_new_pet, ActorKind::Server));
        assert!(!EventDispatcher::broadcasts(got_new_pet, ActorKind::Role));
    }
}
