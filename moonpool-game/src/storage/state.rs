//! Persistent state values and their stable type identifiers.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hasher;

use fnv::FnvHasher;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::StorageError;
use crate::error::ConfigError;

/// A persistence-capable value owned by exactly one component.
///
/// `TYPE_NAME` must be stable across releases: its hash tags every stored
/// record, so renaming the Rust type is fine but renaming `TYPE_NAME` orphans
/// existing data.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Debug, Default, Clone, Serialize, Deserialize)]
/// struct BagState {
///     items: Vec<(u32, u32)>,
/// }
///
/// impl State for BagState {
///     const TYPE_NAME: &'static str = "BagState";
/// }
/// ```
pub trait State: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Stable name of the state type.
    const TYPE_NAME: &'static str;

    /// Stable hash of [`State::TYPE_NAME`].
    fn type_hash() -> u64 {
        type_hash(Self::TYPE_NAME)
    }
}

/// FNV-1a hash of a state type name.
pub fn type_hash(name: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(name.as_bytes());
    hasher.finish()
}

/// FNV-1a hash of serialized state, used to detect changes.
pub(crate) fn content_hash(data: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(data);
    hasher.finish()
}

/// Cache and store key of one state record: `(type hash, entity id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateKey {
    /// Hash of the state type name.
    pub type_hash: u64,
    /// Id of the owning entity.
    pub id: i64,
}

impl StateKey {
    /// Key of state type `S` for entity `id`.
    pub fn of<S: State>(id: i64) -> Self {
        Self {
            type_hash: S::type_hash(),
            id,
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}/{}", self.type_hash, self.id)
    }
}

/// Object-safe view of a [`State`].
pub(crate) trait ErasedState: Any + Send + Sync {
    fn encode(&self) -> Result<Vec<u8>, StorageError>;
    fn to_json(&self) -> Result<serde_json::Value, StorageError>;
    fn state_type(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<S: State> ErasedState for S {
    fn encode(&self) -> Result<Vec<u8>, StorageError> {
        Ok(serde_json::to_vec(self)?)
    }

    fn to_json(&self) -> Result<serde_json::Value, StorageError> {
        Ok(serde_json::to_value(self)?)
    }

    fn state_type(&self) -> &'static str {
        S::TYPE_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

type DecodeFn = fn(&[u8]) -> Result<Box<dyn ErasedState>, StorageError>;

fn decode_state<S: State>(data: &[u8]) -> Result<Box<dyn ErasedState>, StorageError> {
    let value: S = serde_json::from_slice(data)?;
    Ok(Box::new(value))
}

/// Maps type hashes back to concrete state types.
///
/// Lets the runtime decode a stored record without knowing the caller's
/// expected type.
#[derive(Default)]
pub struct StateTypeRegistry {
    types: HashMap<u64, (&'static str, DecodeFn)>,
}

impl StateTypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register state type `S`.
    ///
    /// Fails if `S` is already registered or its hash collides with another
    /// type name.
    pub fn register<S: State>(&mut self) -> Result<(), ConfigError> {
        if self.types.contains_key(&S::type_hash()) {
            return Err(ConfigError::DuplicateStateType(S::TYPE_NAME));
        }
        self.types
            .insert(S::type_hash(), (S::TYPE_NAME, decode_state::<S> as DecodeFn));
        Ok(())
    }

    /// Name registered under `type_hash`.
    pub fn type_name(&self, type_hash: u64) -> Option<&'static str> {
        self.types.get(&type_hash).map(|(name, _)| *name)
    }

    /// Decode a record of any registered type into JSON.
    pub fn decode_json(
        &self,
        type_hash: u64,
        data: &[u8],
    ) -> Result<serde_json::Value, StorageError> {
        self.decode(type_hash, data)?.to_json()
    }

    pub(crate) fn decode(
        &self,
        type_hash: u64,
        data: &[u8],
    ) -> Result<Box<dyn ErasedState>, StorageError> {
        let (_, decode) = self
            .types
            .get(&type_hash)
            .ok_or(StorageError::UnknownType(type_hash))?;
        decode(data)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if no type is registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl fmt::Debug for StateTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.types.values().map(|(name, _)| *name).collect();
        names.sort_unstable();
        f.debug_struct("StateTypeRegistry")
            .field("types", &names)
            .finish()
    }
}
