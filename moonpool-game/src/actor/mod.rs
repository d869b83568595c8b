//! Actors: identity, mailbox, per-actor data and the live actor registry.
//!
//! Every entity (role, account, guild, server) is served by one actor. All
//! work on an entity runs as tasks in its mailbox, one at a time, so agents
//! and state need no locking.

mod cell;
mod id;
mod lifecycle;
mod mailbox;
mod manager;

pub use cell::ActorCell;
pub use id::{ActorKind, EntityKey};
pub use lifecycle::{AgentPhase, DeactivationReason};
pub use mailbox::ActorRef;
pub use manager::ActorManager;

pub(crate) use cell::downcast_agent;
