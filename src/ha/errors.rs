//! HA Coordinator Error Types
//!
//! - Illegitimate local transitions fail loudly
//! - Store unavailability inside the poll loop is logged, never raised
//! - Errors from explicit calls (`start`, `change_mode`) propagate

use std::fmt;

use crate::persist::PersistenceError;
use crate::rebind::RebindError;

/// HA coordinator error type
#[derive(Debug, Clone)]
pub struct HaError {
    /// Error kind
    pub kind: HaErrorKind,
    /// Error message
    pub message: String,
}

/// HA coordinator error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaErrorKind {
    /// State transition not in the transition table
    IllegalTransition,

    /// `start` called twice
    AlreadyStarted,

    /// Operation requires a started coordinator
    NotStarted,

    /// Forced mastery collides with another healthy master
    MasterConflict,

    /// Required collaborator (persister, runtime) missing
    NotConfigured,

    /// Invalid configuration value
    ConfigurationError,

    /// Persister read failed after retries
    Persistence,

    /// Rebind engine failed during a transition
    Rebind,

    /// Poll scheduling failed
    Scheduling,
}

impl HaError {
    /// Create a new HA error.
    pub fn new(kind: HaErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create an illegal transition error.
    pub fn illegal_transition(message: impl Into<String>) -> Self {
        Self::new(HaErrorKind::IllegalTransition, message)
    }

    /// Create an already-started error.
    pub fn already_started(message: impl Into<String>) -> Self {
        Self::new(HaErrorKind::AlreadyStarted, message)
    }

    /// Create a not-started error.
    pub fn not_started(message: impl Into<String>) -> Self {
        Self::new(HaErrorKind::NotStarted, message)
    }

    /// Create a master conflict error.
    pub fn master_conflict(message: impl Into<String>) -> Self {
        Self::new(HaErrorKind::MasterConflict, message)
    }

    /// Create a not-configured error.
    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::new(HaErrorKind::NotConfigured, message)
    }

    /// Create a configuration error.
    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self::new(HaErrorKind::ConfigurationError, message)
    }

    /// Create a scheduling error.
    pub fn scheduling(message: impl Into<String>) -> Self {
        Self::new(HaErrorKind::Scheduling, message)
    }

    /// Whether the error came from an operator or programmer mistake
    /// rather than from a collaborator.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self.kind,
            HaErrorKind::IllegalTransition
                | HaErrorKind::AlreadyStarted
                | HaErrorKind::NotStarted
                | HaErrorKind::MasterConflict
                | HaErrorKind::ConfigurationError
        )
    }
}

impl fmt::Display for HaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HaError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for HaError {}

impl From<PersistenceError> for HaError {
    fn from(err: PersistenceError) -> Self {
        Self::new(HaErrorKind::Persistence, err.to_string())
    }
}

impl From<RebindError> for HaError {
    fn from(err: RebindError) -> Self {
        Self::new(HaErrorKind::Rebind, err.to_string())
    }
}

/// Result type for HA coordinator operations
pub type HaResult<T> = Result<T, HaError>;
