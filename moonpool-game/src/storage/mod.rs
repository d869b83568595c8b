//! State persistence: per-actor cache, persistence adapter, cache tier.
//!
//! The core depends only on two narrow contracts:
//!
//! - [`PersistenceAdapter`]: `find_one` / `save_one` of [`StoredState`] records.
//! - [`CacheBackend`]: an optional shared cache tier in front of the store.
//!
//! Every record is tagged with the stable hash of its [`State::TYPE_NAME`]
//! so it can be decoded through a [`StateTypeRegistry`] without knowing the
//! caller's type.

mod cache;
mod error;
mod memory;
mod state;
mod traits;

pub use cache::StateCache;
pub use error::StorageError;
pub use memory::{InMemoryCacheBackend, InMemoryStore};
pub use state::{type_hash, State, StateKey, StateTypeRegistry};
pub use traits::{CacheBackend, CacheKey, PersistenceAdapter, StateQuery, StoredState};
