//! Error types for the persistence layer.

use thiserror::Error;

/// Errors raised by snapshot bookkeeping.
///
/// Underlying store I/O failures are fatal by policy and are surfaced
/// through [`StorageError::Fatal`]; the node must stop on them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// An `add` targeted a key that already exists.
    #[error("key already exists in storage")]
    KeyAlreadyExists,

    /// A mutation was attempted on a committed (frozen) snapshot.
    #[error("snapshot is frozen after commit")]
    SnapshotFrozen,

    /// A stored value failed to decode.
    #[error("corrupt storage value: {0}")]
    Corrupt(String),

    /// The underlying store failed; indicates hardware or invariant failure.
    #[error("fatal storage failure: {0}")]
    Fatal(String),
}

/// Result alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
