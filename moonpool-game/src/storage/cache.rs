//! Per-actor read-through, write-back state cache.
//!
//! Each actor owns one [`StateCache`]. It is only touched from inside that
//! actor's mailbox, so it has no locking of its own.
//!
//! # Read path
//!
//! ```text
//! live entry ──miss──▶ CacheBackend ──miss──▶ PersistenceAdapter ──miss──▶ None
//! ```
//!
//! # Dirty tracking
//!
//! An entry is dirty if it was installed with [`StateCache::set`], was
//! created fresh, or its serialized form hashes differently from what was
//! last saved. A failed flush leaves the entry dirty.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::state::{content_hash, ErasedState};
use super::{CacheBackend, CacheKey, PersistenceAdapter, State, StateKey, StateQuery, StorageError, StoredState};

struct CacheEntry {
    value: Box<dyn ErasedState>,
    saved_hash: Option<u64>,
    dirty: bool,
}

impl CacheEntry {
    fn is_dirty(&self) -> Result<bool, StorageError> {
        if self.dirty {
            return Ok(true);
        }
        let data = self.value.encode()?;
        Ok(self.saved_hash != Some(content_hash(&data)))
    }
}

/// Cached state objects of one actor.
pub struct StateCache {
    entries: HashMap<StateKey, CacheEntry>,
    store: Arc<dyn PersistenceAdapter>,
    backend: Option<Arc<dyn CacheBackend>>,
}

impl StateCache {
    /// Create an empty cache over `store`, optionally fronted by `backend`.
    pub fn new(store: Arc<dyn PersistenceAdapter>, backend: Option<Arc<dyn CacheBackend>>) -> Self {
        Self {
            entries: HashMap::new(),
            store,
            backend,
        }
    }

    /// Get the state of entity `id`, loading it on a miss.
    ///
    /// Returns `Ok(None)` when neither the cache tier nor the store holds a
    /// record; callers use that to decide between creation and load.
    pub async fn get<S: State>(&mut self, id: i64) -> Result<Option<&mut S>, StorageError> {
        let key = StateKey::of::<S>(id);
        if !self.entries.contains_key(&key) {
            match self.load(key).await? {
                Some(data) => {
                    let value: S = serde_json::from_slice(&data)?;
                    self.install(key, Box::new(value), false)?;
                }
                None => return Ok(None),
            }
        }
        Ok(self.cached_mut::<S>(id))
    }

    /// Get the state of entity `id`, creating a default (dirty) value when
    /// nothing is stored.
    pub async fn get_or_create<S: State>(&mut self, id: i64) -> Result<&mut S, StorageError> {
        let key = StateKey::of::<S>(id);
        if self.get::<S>(id).await?.is_none() {
            debug!(%key, state = S::TYPE_NAME, "creating new state");
            self.install(key, Box::new(S::default()), true)?;
        }
        self.cached_mut::<S>(id)
            .ok_or_else(|| StorageError::OperationFailed(format!("entry {key} vanished")))
    }

    /// Install or replace the state of entity `id` and mark it dirty.
    pub fn set<S: State>(&mut self, id: i64, value: S) {
        let key = StateKey::of::<S>(id);
        let saved_hash = self.entries.get(&key).and_then(|entry| entry.saved_hash);
        self.entries.insert(
            key,
            CacheEntry {
                value: Box::new(value),
                saved_hash,
                dirty: true,
            },
        );
    }

    /// Cached state of entity `id`, without loading.
    pub fn cached<S: State>(&self, id: i64) -> Option<&S> {
        self.entries
            .get(&StateKey::of::<S>(id))
            .and_then(|entry| entry.value.as_any().downcast_ref::<S>())
    }

    /// Mutable cached state of entity `id`, without loading.
    pub fn cached_mut<S: State>(&mut self, id: i64) -> Option<&mut S> {
        self.entries
            .get_mut(&StateKey::of::<S>(id))
            .and_then(|entry| entry.value.as_any_mut().downcast_mut::<S>())
    }

    /// Check whether the entry has changes not yet saved.
    ///
    /// Returns `Ok(false)` for entries that are not cached.
    pub fn is_dirty(&self, key: StateKey) -> Result<bool, StorageError> {
        match self.entries.get(&key) {
            Some(entry) => entry.is_dirty(),
            None => Ok(false),
        }
    }

    /// Check whether any cached entry has unsaved changes.
    pub fn has_dirty(&self) -> Result<bool, StorageError> {
        for entry in self.entries.values() {
            if entry.is_dirty()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Persist every dirty entry.
    ///
    /// All entries are attempted; the first failure is returned after the
    /// rest have been tried. Returns the number of records written.
    pub async fn flush(&mut self) -> Result<usize, StorageError> {
        let keys: Vec<StateKey> = self.entries.keys().copied().collect();
        let mut saved = 0;
        let mut first_error = None;

        for key in keys {
            match self.flush_entry(key).await {
                Ok(true) => saved += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(%key, error = %e, "failed to flush state");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(saved),
        }
    }

    /// Persist one entry if dirty. Returns `true` if a record was written.
    pub async fn flush_entry(&mut self, key: StateKey) -> Result<bool, StorageError> {
        let (record, hash) = {
            let Some(entry) = self.entries.get(&key) else {
                return Ok(false);
            };
            let data = entry.value.encode()?;
            let hash = content_hash(&data);
            if !entry.dirty && entry.saved_hash == Some(hash) {
                return Ok(false);
            }
            let record = StoredState {
                type_hash: key.type_hash,
                type_name: entry.value.state_type().to_string(),
                id: key.id,
                data,
            };
            (record, hash)
        };

        let cached = record.data.clone();
        self.store.save_one(record).await?;
        self.write_backend(key, cached).await?;

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.saved_hash = Some(hash);
            entry.dirty = false;
        }
        debug!(%key, "state flushed");
        Ok(true)
    }

    /// Evict a clean entry.
    ///
    /// Fails with [`StorageError::DirtyEntry`] if it has unsaved changes.
    /// Returns `true` if an entry was removed.
    pub async fn remove<S: State>(&mut self, id: i64) -> Result<bool, StorageError> {
        let key = StateKey::of::<S>(id);
        if self.is_dirty(key)? {
            return Err(StorageError::DirtyEntry(key));
        }
        Ok(self.entries.remove(&key).is_some())
    }

    /// Flush the entry if needed, then evict it.
    pub async fn evict<S: State>(&mut self, id: i64) -> Result<bool, StorageError> {
        let key = StateKey::of::<S>(id);
        self.flush_entry(key).await?;
        Ok(self.entries.remove(&key).is_some())
    }

    /// Drop every entry. Only valid once [`StateCache::has_dirty`] is false.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// JSON view of a cached entry.
    pub fn snapshot_json(&self, key: StateKey) -> Option<Result<serde_json::Value, StorageError>> {
        self.entries.get(&key).map(|entry| entry.value.to_json())
    }

    /// Check whether an entry is cached.
    pub fn contains(&self, key: StateKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn install(&mut self, key: StateKey, value: Box<dyn ErasedState>, fresh: bool) -> Result<(), StorageError> {
        let saved_hash = if fresh {
            None
        } else {
            Some(content_hash(&value.encode()?))
        };
        self.entries.insert(
            key,
            CacheEntry {
                value,
                saved_hash,
                dirty: fresh,
            },
        );
        Ok(())
    }

    /// Mirror a saved record into the cache tier.
    ///
    /// A rejected write must not leave older bytes there for the next load to
    /// prefer over the store, so the key is dropped instead. If that fails
    /// too the entry stays dirty and the next flush tries again.
    async fn write_backend(&self, key: StateKey, data: Vec<u8>) -> Result<(), StorageError> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        let cache_key = CacheKey::from(key);
        let Err(e) = backend.set(cache_key.clone(), data).await else {
            return Ok(());
        };
        warn!(%key, error = %e, "cache backend write failed, dropping cached copy");
        match backend.remove(&cache_key).await {
            Ok(_) => Ok(()),
            Err(remove_error) => {
                warn!(%key, error = %remove_error, "cache backend still holds a stale copy");
                Err(e)
            }
        }
    }

    async fn load(&self, key: StateKey) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(backend) = &self.backend {
            match backend.get(&CacheKey::from(key)).await {
                Ok(Some(data)) => return Ok(Some(data)),
                Ok(None) => {}
                Err(e) => warn!(%key, error = %e, "cache backend read failed, using store"),
            }
        }

        let Some(record) = self.store.find_one(&StateQuery::from(key)).await? else {
            return Ok(None);
        };
        if record.type_hash != key.type_hash {
            return Err(StorageError::TypeMismatch {
                key,
                expected: key.type_hash,
                found: record.type_hash,
            });
        }

        if let Some(backend) = &self.backend {
            if let Err(e) = backend.set(CacheKey::from(key), record.data.clone()).await {
                warn!(%key, error = %e, "cache backend fill failed");
            }
        }
        Ok(Some(record.data))
    }
}

impl fmt::Debug for StateCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCache")
            .field("entries", &self.entries.len())
            .field("backend", &self.backend.is_some())
            .finish()
    }
}
