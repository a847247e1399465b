//! CLI-specific error types
//!
//! All CLI errors end the process with a non-zero exit code.

use std::fmt;
use std::io;

use crate::ha::HaError;
use crate::persist::PersistenceError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout, config file)
    IoError,
    /// Node already registered in the store
    AlreadyInitialized,
    /// Node id not yet assigned
    NotInitialized,
    /// Coordinator failed to start
    BootFailed,
    /// Shared store unreadable
    StoreError,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "PLANE_CLI_CONFIG_ERROR",
            Self::IoError => "PLANE_CLI_IO_ERROR",
            Self::AlreadyInitialized => "PLANE_CLI_ALREADY_INITIALIZED",
            Self::NotInitialized => "PLANE_CLI_NOT_INITIALIZED",
            Self::BootFailed => "PLANE_CLI_BOOT_FAILED",
            Self::StoreError => "PLANE_CLI_STORE_ERROR",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn already_initialized(node_id: &str) -> Self {
        Self::new(
            CliErrorCode::AlreadyInitialized,
            format!("Node {} is already registered in the store", node_id),
        )
    }

    pub fn not_initialized() -> Self {
        Self::new(
            CliErrorCode::NotInitialized,
            "Config has no node_id. Run 'aeroplane init' first.",
        )
    }

    pub fn boot_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::BootFailed, msg)
    }

    pub fn store_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::StoreError, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<PersistenceError> for CliError {
    fn from(e: PersistenceError) -> Self {
        Self::store_error(e.to_string())
    }
}

impl From<HaError> for CliError {
    fn from(e: HaError) -> Self {
        if e.kind == crate::ha::HaErrorKind::ConfigurationError {
            Self::config_error(e.message)
        } else {
            Self::boot_failed(e.to_string())
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_code() {
        let err = CliError::not_initialized();
        assert!(err.to_string().starts_with("PLANE_CLI_NOT_INITIALIZED: "));
    }

    #[test]
    fn test_from_ha_error() {
        let err: CliError = HaError::configuration_error("bad timeout").into();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);

        let err: CliError = HaError::master_conflict("n0 is master").into();
        assert_eq!(err.code(), &CliErrorCode::BootFailed);
    }
}
