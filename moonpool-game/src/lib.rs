//! # Moonpool Game
//!
//! Single-process actor runtime for game servers.
//!
//! Every entity (a role, an account, a guild) and every server-wide service
//! is an actor with its own mailbox. Business behavior lives in hot-swappable
//! agents, one per component, whose persistent data sits in a per-actor
//! state cache backed by a pluggable store.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ transport (out of crate): sessions, frames                  │
//! ├──────────────────────┬─────────────────────────────────────┤
//! │ MessageDispatcher    │ EventDispatcher     TimerScheduler   │
//! │ • msg id → handler   │ • self + fan-out    • delay/schedule │
//! ├──────────────────────┴─────────────────────────────────────┤
//! │ ActorManager → ActorRef (mailbox) → ActorCell               │
//! │   agents (HotfixModule)        StateCache → store           │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use moonpool_game::prelude::*;
//!
//! let module = HotfixModule::builder("logic-v1")
//!     .agent::<RoleComponent, _>("RoleAgent", || Box::new(RoleAgent))
//!     .handler(LevelUpHandler)
//!     .build()?;
//!
//! let runtime = GameRuntime::builder()
//!     .component::<RoleComponent>()
//!     .module(module)
//!     .store(Arc::new(InMemoryStore::new()))
//!     .build()?;
//! runtime.start().await?;
//! ```
//!
//! ## Modules
//!
//! - [`actor`] - Entity keys, mailboxes, the actor registry
//! - [`component`] - Components, agents, hotfix modules
//! - [`messaging`] - Client frames, codec, handlers, sessions
//! - [`event`] - In-process events and listeners
//! - [`timer`] - Actor-bound timers
//! - [`storage`] - State cache and persistence adapters
//! - [`runtime`] - Assembly, maintenance and shutdown

#![warn(missing_docs)]

pub mod actor;
pub mod component;
pub mod config;
pub mod error;
pub mod event;
pub mod messaging;
pub mod prelude;
pub mod runtime;
pub mod storage;
pub mod timer;

pub use actor::{ActorCell, ActorKind, ActorRef, EntityKey};
pub use component::{Agent, AgentContext, Component, ComponentKind, HotfixModule};
pub use config::RuntimeConfig;
pub use error::{ActorError, ConfigError, DispatchError};
pub use runtime::{GameRuntime, RuntimeBuilder, SaveReport};
