//! HA Coordinator Configuration
//!
//! - Poll period and heartbeat timeout are independent values
//! - The heartbeat timeout must exceed the poll period
//! - Fixed once `start` runs, except the poll period (`set_poll_period`)

use std::time::Duration;

use super::errors::{HaError, HaResult};
use super::state::ManagementNodeState;
use crate::observability::Logger;

/// Default interval between publish-and-check cycles
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(5);

/// Default age at which another node's heartbeat is considered stale
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinator timing and fallback role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaConfig {
    /// `None` disables scheduled polling; cycles then run only when called
    pub poll_period: Option<Duration>,

    pub heartbeat_timeout: Duration,

    /// Status a master demotes to when no standby mode was requested
    pub default_standby: ManagementNodeState,
}

impl Default for HaConfig {
    fn default() -> Self {
        Self {
            poll_period: Some(DEFAULT_POLL_PERIOD),
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            default_standby: ManagementNodeState::Standby,
        }
    }
}

impl HaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_period(mut self, poll_period: Option<Duration>) -> Self {
        self.poll_period = poll_period;
        self
    }

    pub fn with_heartbeat_timeout(mut self, heartbeat_timeout: Duration) -> Self {
        self.heartbeat_timeout = heartbeat_timeout;
        self
    }

    pub fn with_default_standby(mut self, default_standby: ManagementNodeState) -> Self {
        self.default_standby = default_standby;
        self
    }

    /// Validate the configuration.
    ///
    /// A heartbeat timeout under three poll periods passes but is logged,
    /// since ordinary scheduling jitter can then look like a failure.
    pub fn validate(&self) -> HaResult<()> {
        if self.heartbeat_timeout.is_zero() {
            return Err(HaError::configuration_error(
                "heartbeat_timeout must be greater than zero",
            ));
        }

        if !self.default_standby.is_standby() {
            return Err(HaError::configuration_error(format!(
                "default_standby must be a standby state, got {}",
                self.default_standby
            )));
        }

        if let Some(poll) = self.poll_period {
            if poll.is_zero() {
                return Err(HaError::configuration_error(
                    "poll_period must be greater than zero",
                ));
            }
            if self.heartbeat_timeout <= poll {
                return Err(HaError::configuration_error(format!(
                    "heartbeat_timeout ({}ms) must be greater than poll_period ({}ms)",
                    self.heartbeat_timeout.as_millis(),
                    poll.as_millis()
                )));
            }
            if self.heartbeat_timeout < poll * 3 {
                Logger::warn(
                    "HA_CONFIG_TIGHT_TIMEOUT",
                    &[
                        ("heartbeat_timeout_ms", &self.heartbeat_timeout.as_millis().to_string()),
                        ("poll_period_ms", &poll.as_millis().to_string()),
                    ],
                );
            }
        }

        Ok(())
    }
}
