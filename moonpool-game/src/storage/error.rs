//! Storage error types.

use super::StateKey;

/// Errors that can occur during cache or persistence operations.
///
/// A failed flush never clears the dirty marker, so the same entry is
/// retried by the next flush.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// The backing store cannot be reached.
    #[error("Storage unavailable")]
    Unavailable,

    /// The store refused the write.
    #[error("Write rejected for {key}: {reason}")]
    WriteRejected {
        /// Entry that failed to save.
        key: StateKey,
        /// Reason reported by the store.
        reason: String,
    },

    /// Failed to serialize or deserialize state data.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The stored record belongs to a different state type.
    #[error("Record for {key} has type hash {found:#018x}, expected {expected:#018x}")]
    TypeMismatch {
        /// Requested entry.
        key: StateKey,
        /// Type hash of the requested state type.
        expected: u64,
        /// Type hash found in the record.
        found: u64,
    },

    /// No state type is registered under this hash.
    #[error("Unknown state type hash {0:#018x}")]
    UnknownType(u64),

    /// The entry has unsaved changes and cannot be evicted.
    #[error("Entry {0} has unsaved changes")]
    DirtyEntry(StateKey),

    /// Generic storage failure.
    #[error("Storage operation failed: {0}")]
    OperationFailed(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
