//! Rebind Errors

use thiserror::Error;

/// Result type for rebind operations
pub type RebindResult<T> = Result<T, RebindError>;

/// Rebind errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RebindError {
    // ==================
    // Graph Errors
    // ==================
    /// Mutation attempted on a hot-standby mirror
    #[error("Mutation rejected, graph is a read-only mirror: {0}")]
    ReadOnlyViolation(String),

    /// Entity does not exist
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// Graph was released after demotion
    #[error("Graph handle has been released")]
    Released,

    /// Operation needs a read-only mirror
    #[error("Graph is not a read-only mirror")]
    NotAMirror,

    // ==================
    // Model Errors
    // ==================
    /// Model store unreachable or failing
    #[error("Model store error: {0}")]
    Store(String),

    /// Persisted model cannot be loaded
    #[error("Invalid model: {0}")]
    InvalidModel(String),
}
