//! Client connections as seen by the dispatcher.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tracing::{debug, info};

use super::envelope::OutboundFrame;
use crate::actor::EntityKey;
use crate::error::DispatchError;

/// Write side of a client connection, provided by the transport.
pub trait ClientChannel: Send + Sync + fmt::Debug {
    /// Queue a frame for the client.
    fn write(&self, frame: OutboundFrame);

    /// Report a message that could not be routed to any actor.
    fn routing_error(&self, error: &DispatchError);

    /// Close the connection.
    fn close(&self);

    /// Returns `true` once the connection is closed.
    fn is_closed(&self) -> bool;
}

/// One client connection and the entity it is bound to after login.
pub struct Session {
    id: u64,
    channel: Arc<dyn ClientChannel>,
    entity: Mutex<Option<EntityKey>>,
}

impl Session {
    /// Create an unbound session.
    pub fn new(id: u64, channel: Arc<dyn ClientChannel>) -> Self {
        Self {
            id,
            channel,
            entity: Mutex::new(None),
        }
    }

    /// Connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Write side of the connection.
    pub fn channel(&self) -> &Arc<dyn ClientChannel> {
        &self.channel
    }

    /// Entity this connection is logged in as.
    pub fn entity(&self) -> Option<EntityKey> {
        *self.entity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind the connection to an entity.
    pub fn bind(&self, key: EntityKey) {
        *self.entity.lock().unwrap_or_else(PoisonError::into_inner) = Some(key);
    }

    /// Forget the bound entity.
    pub fn unbind(&self) -> Option<EntityKey> {
        self.entity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Write a frame to the client.
    pub fn write(&self, frame: OutboundFrame) {
        self.channel.write(frame);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("entity", &self.entity())
            .finish()
    }
}

/// Online sessions indexed by the entity they are bound to.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: DashMap<EntityKey, Arc<Session>>,
}

impl SessionManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `session` to `key`, replacing any previous connection.
    ///
    /// A previous connection with a different id is closed and returned.
    pub fn bind(&self, key: EntityKey, session: Arc<Session>) -> Option<Arc<Session>> {
        session.bind(key);
        let previous = self.sessions.insert(key, session.clone())?;
        if previous.id() == session.id() {
            return None;
        }
        info!(entity = %key, old = previous.id(), new = session.id(), "session replaced");
        previous.unbind();
        previous.channel().close();
        Some(previous)
    }

    /// Session bound to `key`.
    pub fn get(&self, key: &EntityKey) -> Option<Arc<Session>> {
        self.sessions.get(key).map(|entry| entry.value().clone())
    }

    /// Remove the session bound to `key`.
    pub fn remove(&self, key: &EntityKey) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(key)?;
        debug!(entity = %key, session = session.id(), "session removed");
        Some(session)
    }

    /// Remove the session bound to `key` only if it is connection `session_id`.
    ///
    /// Used on disconnect so a stale connection never unbinds its replacement.
    pub fn remove_if_current(&self, key: &EntityKey, session_id: u64) -> Option<Arc<Session>> {
        let (_, session) = self
            .sessions
            .remove_if(key, |_, session| session.id() == session_id)?;
        Some(session)
    }

    /// Write a frame to the client bound to `key`. Returns `false` if offline.
    pub fn notify(&self, key: &EntityKey, frame: OutboundFrame) -> bool {
        match self.get(key) {
            Some(session) => {
                session.write(frame);
                true
            }
            None => false,
        }
    }

    /// Remove every session, closing their connections.
    pub fn remove_all(&self) -> Vec<EntityKey> {
        let keys: Vec<EntityKey> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for key in &keys {
            if let Some((_, session)) = self.sessions.remove(key) {
                session.channel().close();
            }
        }
        keys
    }

    /// Number of bound sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no session is bound.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// In-process [`ClientChannel`] that records everything written to it.
///
/// Useful for bots, tools and tests.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    frames: Mutex<Vec<OutboundFrame>>,
    routing_errors: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MemoryChannel {
    /// Create an open channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames written so far.
    pub fn frames(&self) -> Vec<OutboundFrame> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Routing errors reported so far, rendered as text.
    pub fn routing_errors(&self) -> Vec<String> {
        self.routing_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ClientChannel for MemoryChannel {
    fn write(&self, frame: OutboundFrame) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame);
    }

    fn routing_error(&self, error: &DispatchError) {
        self.routing_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error.to_string());
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorKind;

    fn session(id: u64) -> (Arc<MemoryChannel>, Arc<Session>) {
        let channel = Arc::new(MemoryChannel::new());
        let session = Arc::new(Session::new(id, channel.clone()));
        (channel, session)
    }

    #[test]
    fn test_bind_replaces_previous_connection() {
        let manager = SessionManager::new();
        let role = EntityKey::new(ActorKind::Role, 10);
        let (old_channel, old) = session(1);
        let (new_channel, new) = session(2);

        assert!(manager.bind(role, old.clone()).is_none());
        let replaced = manager.bind(role, new.clone()).expect("previous session");

        assert_eq!(replaced.id(), 1);
        assert!(old_channel.is_closed());
        assert!(!new_channel.is_closed());
        assert_eq!(old.entity(), None);
        assert_eq!(new.entity(), Some(role));
    }

    #[test]
    fn test_stale_disconnect_keeps_replacement() {
        let manager = SessionManager::new();
        let role = EntityKey::new(ActorKind::Role, 11);
        let (_, old) = session(1);
        let (_, new) = session(2);
        manager.bind(role, old);
        manager.bind(role, new);

        assert!(manager.remove_if_current(&role, 1).is_none());
        assert_eq!(manager.get(&role).map(|s| s.id()), Some(2));
        assert!(manager.remove_if_current(&role, 2).is_some());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_notify_offline() {
        let manager = SessionManager::new();
        let role = EntityKey::new(ActorKind::Role, 12);
        assert!(!manager.notify(&role, OutboundFrame::success(0, None)));

        let (channel, s) = session(3);
        manager.bind(role, s);
        assert!(manager.notify(&role, OutboundFrame::success(0, None)));
        assert_eq!(channel.frames().len(), 1);
    }
}
