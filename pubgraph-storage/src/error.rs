//! Error types for the storage layer.

use pubgraph_model::ValidationError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A staged value does not fit its field.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Record not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// More than one record matched a lookup that must be unique.
    #[error("ambiguous match: {0}")]
    Ambiguous(String),

    /// Invalid data read back from the database.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A previous holder of the connection panicked.
    #[error("connection lock poisoned")]
    LockPoisoned,
}
