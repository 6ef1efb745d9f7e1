//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Document not found.
    #[error("document not found: {0}")]
    NotFound(String),

    /// A declared unique index already holds the same tuple of values.
    #[error("unique index ({}) violated in collection '{collection}'", fields.join(", "))]
    UniqueViolation {
        collection: String,
        fields: Vec<String>,
    },

    /// A lock guarding backend state was poisoned by a panicking writer.
    #[error("backend lock poisoned")]
    LockPoisoned,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (snapshot files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid data.
    #[error("invalid data: {0}")]
    InvalidData(String),
}
