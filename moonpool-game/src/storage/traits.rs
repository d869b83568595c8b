//! Contracts consumed by the state cache.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{StateKey, StorageError};

/// Lookup predicate understood by a [`PersistenceAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateQuery {
    /// Hash of the state type.
    pub type_hash: u64,
    /// Id of the owning entity.
    pub id: i64,
}

impl From<StateKey> for StateQuery {
    fn from(key: StateKey) -> Self {
        Self {
            type_hash: key.type_hash,
            id: key.id,
        }
    }
}

/// One persisted state record.
///
/// `type_hash` identifies the concrete state type so a record can be decoded
/// without knowing the caller's expected type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    /// Hash of the state type name.
    pub type_hash: u64,
    /// State type name, kept for humans inspecting the store.
    pub type_name: String,
    /// Id of the owning entity.
    pub id: i64,
    /// Serialized state.
    pub data: Vec<u8>,
}

impl StoredState {
    /// Key of this record.
    pub fn key(&self) -> StateKey {
        StateKey {
            type_hash: self.type_hash,
            id: self.id,
        }
    }
}

/// Narrow persistence contract: find one record, save one record.
///
/// Implementations must tolerate concurrent calls from independent actors
/// and provide per-record atomicity.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync + fmt::Debug {
    /// Find the record matching `query`.
    ///
    /// Returns `Ok(None)` when no record exists.
    async fn find_one(&self, query: &StateQuery) -> Result<Option<StoredState>, StorageError>;

    /// Insert or replace one record.
    async fn save_one(&self, record: StoredState) -> Result<(), StorageError>;
}

/// Key understood by a [`CacheBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// String identity.
    Str(String),
    /// Numeric identity.
    Num(i64),
}

impl From<StateKey> for CacheKey {
    fn from(key: StateKey) -> Self {
        CacheKey::Str(key.to_string())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Str(key) => f.write_str(key),
            CacheKey::Num(key) => write!(f, "{key}"),
        }
    }
}

/// Shared cache tier sitting between the per-actor state cache and the
/// persistent store (in-process map, remote cache, ...).
#[async_trait]
pub trait CacheBackend: Send + Sync + fmt::Debug {
    /// Read a cached value.
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, StorageError>;

    /// Insert or replace a cached value.
    async fn set(&self, key: CacheKey, value: Vec<u8>) -> Result<(), StorageError>;

    /// Remove a cached value. Returns `true` if it existed.
    async fn remove(&self, key: &CacheKey) -> Result<bool, StorageError>;

    /// Check whether a value is cached.
    async fn contains(&self, key: &CacheKey) -> Result<bool, StorageError>;

    /// Push buffered writes to the backend, if it buffers any.
    async fn flush(&self) -> Result<(), StorageError>;

    /// Extend the lifetime of a cached value. Returns `true` if it exists.
    async fn refresh(&self, key: &CacheKey) -> Result<bool, StorageError>;
}
