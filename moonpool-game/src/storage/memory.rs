//! In-memory persistence and cache backends.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{CacheBackend, CacheKey, PersistenceAdapter, StateQuery, StorageError, StoredState};

/// In-memory persistence adapter for tests and single-process deployments.
///
/// Availability can be toggled to exercise the persistence error path; while
/// unavailable every call fails with [`StorageError::Unavailable`].
#[derive(Debug)]
pub struct InMemoryStore {
    records: DashMap<StateQuery, StoredState>,
    available: AtomicBool,
    saves: AtomicUsize,
}

impl InMemoryStore {
    /// Create an empty, available store.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            available: AtomicBool::new(true),
            saves: AtomicUsize::new(0),
        }
    }

    /// Make the store reachable or unreachable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of successful `save_one` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copy of the record matching `query`, bypassing availability checks.
    pub fn record(&self, query: &StateQuery) -> Option<StoredState> {
        self.records.get(query).map(|entry| entry.value().clone())
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable)
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryStore {
    async fn find_one(&self, query: &StateQuery) -> Result<Option<StoredState>, StorageError> {
        self.check_available()?;
        Ok(self.record(query))
    }

    async fn save_one(&self, record: StoredState) -> Result<(), StorageError> {
        self.check_available()?;
        let query = StateQuery::from(record.key());
        self.records.insert(query, record);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Process-local [`CacheBackend`] backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    entries: DashMap<CacheKey, Vec<u8>>,
}

impl InMemoryCacheBackend {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: CacheKey, value: Vec<u8>) -> Result<(), StorageError> {
        self.entries.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool, StorageError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn contains(&self, key: &CacheKey) -> Result<bool, StorageError> {
        Ok(self.entries.contains_key(key))
    }

    async fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn refresh(&self, key: &CacheKey) -> Result<bool, StorageError> {
        // Entries never expire in process.
        Ok(self.entries.contains_key(key))
    }
}
