//! Store error types.

use thiserror::Error;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the call.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A record referenced by the call does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored data could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error while loading or saving a snapshot.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
