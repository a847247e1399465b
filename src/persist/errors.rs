//! Persistence Errors

use std::io;

use thiserror::Error;

/// Result type for persister operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Persister errors
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    /// Persister has been stopped
    #[error("Persister is not running")]
    NotRunning,

    /// Backing store cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Record could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Pending writes did not complete in time
    #[error("Timed out after {0}ms waiting for writes")]
    WriteTimeout(u128),
}

impl From<io::Error> for PersistenceError {
    fn from(err: io::Error) -> Self {
        PersistenceError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}
