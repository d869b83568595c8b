//! Common imports for game logic.
//!
//! ```ignore
//! use moonpool_game::prelude::*;
//! ```

pub use crate::actor::{ActorCell, ActorKind, ActorRef, AgentPhase, DeactivationReason, EntityKey};
pub use crate::component::{Agent, AgentContext, Component, ComponentKind, HotfixModule};
pub use crate::config::RuntimeConfig;
pub use crate::error::{ActorError, ConfigError, DispatchError};
pub use crate::event::{Event, EventId, EventListener, Payload};
pub use crate::messaging::{
    Handler, HandlerScope, Inbound, InboundFrame, Message, MsgId, Outbound, Session, StatusCode,
};
pub use crate::runtime::{GameRuntime, SaveReport};
pub use crate::storage::{InMemoryStore, PersistenceAdapter, State, StorageError};
pub use crate::timer::{TimerHandler, TimerId};

pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
pub use std::sync::Arc;
pub use std::time::Duration;

/// Result of agent and handler code.
pub type Result<T> = std::result::Result<T, ActorError>;
