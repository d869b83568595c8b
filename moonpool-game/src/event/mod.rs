//! Typed events with per-actor self-handling and global fan-out.
//!
//! An event is always delivered to the originating actor's own listeners
//! first. Events above [`EventId::GLOBAL_BOUNDARY`] raised by a global actor
//! are then broadcast to every online entity through the coordinating
//! server actor. See [`EventDispatcher`].

mod dispatcher;
mod listener;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::actor::EntityKey;

pub use dispatcher::EventDispatcher;
pub use listener::{EventListener, ListenerTable};

/// Numeric event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub i32);

impl EventId {
    /// Ids above this value are server-wide events.
    pub const GLOBAL_BOUNDARY: i32 = 1000;

    /// Raised on an entity's actor when its session is removed.
    pub const SESSION_REMOVED: EventId = EventId(1);

    /// Returns `true` for server-wide event ids.
    pub fn is_global(&self) -> bool {
        self.0 > Self::GLOBAL_BOUNDARY
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Data carried by an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// No data.
    #[default]
    Empty,
    /// An integer.
    Int(i64),
    /// A string.
    Text(String),
    /// Another entity.
    Entity(EntityKey),
    /// Arbitrary structured data.
    Json(serde_json::Value),
}

/// An event as seen by listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event id.
    pub id: EventId,
    /// Actor that raised the event.
    pub origin: EntityKey,
    /// Event data.
    pub payload: Payload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_partition() {
        assert!(!EventId::SESSION_REMOVED.is_global());
        assert!(!EventId(EventId::GLOBAL_BOUNDARY).is_global());
        assert!(EventId(EventId::GLOBAL_BOUNDARY + 1).is_global());
    }
}
