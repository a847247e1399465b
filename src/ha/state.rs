//! Node State Machine
//!
//! - States are explicit and enumerable
//! - Every local status change goes through [`ManagementNodeState::transition`]
//! - No node resurrects from TERMINATED
//! - FAILED is normally inferred about other nodes; a node assigns it to
//!   itself only when a promotion or forced standby transition breaks

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::{HaError, HaResult};

/// Status of one management node as published in its sync record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManagementNodeState {
    /// Started but not yet settled into a role
    Initializing,
    /// Cold standby: no live resource graph
    Standby,
    /// Standby with a pre-validated persisted model
    WarmStandby,
    /// Standby with a live read-only mirror
    HotStandby,
    /// The single write-capable node
    Master,
    /// Unhealthy; inferred for others, self-assigned on broken transitions
    Failed,
    /// Stopped gracefully
    Terminated,
}

impl ManagementNodeState {
    /// Get the state name for observability.
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Initializing => "INITIALIZING",
            Self::Standby => "STANDBY",
            Self::WarmStandby => "WARM_STANDBY",
            Self::HotStandby => "HOT_STANDBY",
            Self::Master => "MASTER",
            Self::Failed => "FAILED",
            Self::Terminated => "TERMINATED",
        }
    }

    /// Statuses a node may hold while counting as a healthy election candidate.
    pub fn is_healthy_status(&self) -> bool {
        matches!(
            self,
            Self::Master | Self::Standby | Self::WarmStandby | Self::HotStandby
        )
    }

    /// One of the three follower statuses.
    pub fn is_standby(&self) -> bool {
        matches!(self, Self::Standby | Self::WarmStandby | Self::HotStandby)
    }

    /// FAILED or TERMINATED.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Terminated)
    }

    /// Whether `self → to` is in the transition table.
    ///
    /// Staying in the same state is always allowed, except that nothing
    /// leaves TERMINATED.
    pub fn can_transition_to(&self, to: ManagementNodeState) -> bool {
        use ManagementNodeState::*;

        if *self == to {
            return true;
        }
        match self {
            Initializing => true,
            Standby | WarmStandby | HotStandby => {
                matches!(to, Standby | WarmStandby | HotStandby | Master | Failed | Terminated)
            }
            Master => matches!(to, Standby | WarmStandby | HotStandby | Failed | Terminated),
            Failed => matches!(to, Standby | WarmStandby | HotStandby | Master | Terminated),
            Terminated => false,
        }
    }

    /// Move to `to`, rejecting transitions outside the table.
    pub fn transition(self, to: ManagementNodeState) -> HaResult<ManagementNodeState> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(Self::forbidden_transition(self, to))
        }
    }

    fn forbidden_transition(from: ManagementNodeState, to: ManagementNodeState) -> HaError {
        HaError::illegal_transition(format!(
            "transition from {} to {} is not allowed",
            from.state_name(),
            to.state_name()
        ))
    }
}

impl fmt::Display for ManagementNodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state_name())
    }
}

/// Mode passed to `start` and `change_mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HighAvailabilityMode {
    /// No coordination; single-node master
    Disabled,
    /// Run the chooser to decide
    Auto,
    /// Force mastery
    Master,
    /// Force cold standby
    Standby,
    /// Force hot standby
    HotStandby,
    /// Force warm standby
    WarmStandby,
}

impl HighAvailabilityMode {
    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::Disabled => "DISABLED",
            Self::Auto => "AUTO",
            Self::Master => "MASTER",
            Self::Standby => "STANDBY",
            Self::HotStandby => "HOT_STANDBY",
            Self::WarmStandby => "WARM_STANDBY",
        }
    }

    /// The node status a forced standby mode settles into.
    pub fn standby_state(&self) -> Option<ManagementNodeState> {
        match self {
            Self::Standby => Some(ManagementNodeState::Standby),
            Self::HotStandby => Some(ManagementNodeState::HotStandby),
            Self::WarmStandby => Some(ManagementNodeState::WarmStandby),
            _ => None,
        }
    }

    /// Mode that re-enters a standby status.
    pub fn for_standby_state(state: ManagementNodeState) -> Option<Self> {
        match state {
            ManagementNodeState::Standby => Some(Self::Standby),
            ManagementNodeState::HotStandby => Some(Self::HotStandby),
            ManagementNodeState::WarmStandby => Some(Self::WarmStandby),
            _ => None,
        }
    }
}

impl fmt::Display for HighAvailabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mode_name())
    }
}

impl FromStr for HighAvailabilityMode {
    type Err = HaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "DISABLED" => Ok(Self::Disabled),
            "AUTO" => Ok(Self::Auto),
            "MASTER" => Ok(Self::Master),
            "STANDBY" => Ok(Self::Standby),
            "HOT_STANDBY" => Ok(Self::HotStandby),
            "WARM_STANDBY" => Ok(Self::WarmStandby),
            _ => Err(HaError::configuration_error(format!(
                "unknown high-availability mode '{}'",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ManagementNodeState::*;

    // =========================================================================
    // TRANSITION TABLE
    // =========================================================================

    #[test]
    fn test_initializing_reaches_every_role() {
        for to in [Standby, WarmStandby, HotStandby, Master, Failed, Terminated] {
            assert!(Initializing.transition(to).is_ok(), "INITIALIZING -> {}", to);
        }
    }

    #[test]
    fn test_master_demotes_to_standby_modes() {
        assert_eq!(Master.transition(Standby).unwrap(), Standby);
        assert_eq!(Master.transition(HotStandby).unwrap(), HotStandby);
        assert!(Master.transition(Initializing).is_err());
    }

    #[test]
    fn test_terminated_is_final() {
        for to in [Initializing, Standby, Master, Failed] {
            let err = Terminated.transition(to).unwrap_err();
            assert_eq!(err.kind, crate::ha::HaErrorKind::IllegalTransition);
        }
        assert!(Terminated.transition(Terminated).is_ok());
    }

    #[test]
    fn test_failed_can_recover() {
        assert!(Failed.transition(Standby).is_ok());
        assert!(Failed.transition(Master).is_ok());
        assert!(Failed.transition(Initializing).is_err());
    }

    #[test]
    fn test_standby_cannot_reinitialize() {
        assert!(Standby.transition(Initializing).is_err());
        assert!(HotStandby.transition(Standby).is_ok());
    }

    // =========================================================================
    // CLASSIFICATION
    // =========================================================================

    #[test]
    fn test_healthy_statuses() {
        assert!(Master.is_healthy_status());
        assert!(WarmStandby.is_healthy_status());
        assert!(!Initializing.is_healthy_status());
        assert!(!Failed.is_healthy_status());
        assert!(!Terminated.is_healthy_status());
    }

    #[test]
    fn test_state_serde_names() {
        let json = serde_json::to_string(&HotStandby).unwrap();
        assert_eq!(json, "\"HOT_STANDBY\"");
        let parsed: ManagementNodeState = serde_json::from_str("\"WARM_STANDBY\"").unwrap();
        assert_eq!(parsed, WarmStandby);
    }

    // =========================================================================
    // MODES
    // =========================================================================

    #[test]
    fn test_mode_parse() {
        assert_eq!("auto".parse::<HighAvailabilityMode>().unwrap(), HighAvailabilityMode::Auto);
        assert_eq!(
            "hot-standby".parse::<HighAvailabilityMode>().unwrap(),
            HighAvailabilityMode::HotStandby
        );
        assert!("leader".parse::<HighAvailabilityMode>().is_err());
    }

    #[test]
    fn test_mode_standby_state() {
        assert_eq!(HighAvailabilityMode::WarmStandby.standby_state(), Some(WarmStandby));
        assert_eq!(HighAvailabilityMode::Auto.standby_state(), None);
        assert_eq!(
            HighAvailabilityMode::for_standby_state(HotStandby),
            Some(HighAvailabilityMode::HotStandby)
        );
    }
}
