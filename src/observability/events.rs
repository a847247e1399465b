//! Observable coordinator events
//!
//! Events are explicit and typed; each carries a stable name and a default severity.

use std::fmt;

use super::logger::{Logger, Severity};

/// Observable events in the HA coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HaEvent {
    // Lifecycle
    /// Coordinator started in a given mode
    Start,
    /// Coordinator stopped
    Stop,
    /// Coordination disabled (single-node mode)
    Disabled,
    /// Mode changed after start
    ModeChanged,

    // Heartbeats
    /// This node's record was published
    HeartbeatPublished,
    /// Publishing this node's record failed
    HeartbeatWriteFailed,
    /// This node's own record is missing or stale in the shared view
    OwnHeartbeatStale,
    /// Loading the shared view failed
    SnapshotLoadFailed,

    // Election
    /// The recorded master is unhealthy; an election runs
    MasterHeartbeatTimeout,
    /// A master change was observed
    MasterChangeDetected,
    /// This node reasserted mastery that had been overwritten
    MasterReasserted,
    /// This node promoted itself
    Promoted,
    /// This node demoted itself
    Demoted,
    /// More than one node claims mastery
    SplitBrainDetected,
    /// This node relinquished mastery to heal a split brain
    SplitBrainResolved,

    // Standby modes
    /// A read-only mirror is active
    HotStandbyActive,
    /// The persisted model validated for warm standby
    WarmStandbyActive,
    /// A standby-mode transition could not complete
    StandbyTransitionFailed,
    /// Incremental mirror catch-up failed
    MirrorStepFailed,
    /// Rebind failed during promotion
    RebindFailed,

    // Poll loop
    /// Poll task (re)registered
    PollRegistered,
    /// A poll cycle failed
    PollFailed,

    // Persistence
    /// Persister ignored a delta because it is not running
    PersisterDeltaDropped,
    /// A node record could not be decoded
    PersisterRecordGarbled,
}

impl HaEvent {
    /// Returns the stable event name
    pub fn as_str(&self) -> &'static str {
        match self {
            HaEvent::Start => "HA_START",
            HaEvent::Stop => "HA_STOP",
            HaEvent::Disabled => "HA_DISABLED",
            HaEvent::ModeChanged => "HA_MODE_CHANGED",
            HaEvent::HeartbeatPublished => "HA_HEARTBEAT_PUBLISHED",
            HaEvent::HeartbeatWriteFailed => "HA_HEARTBEAT_WRITE_FAILED",
            HaEvent::OwnHeartbeatStale => "HA_OWN_HEARTBEAT_STALE",
            HaEvent::SnapshotLoadFailed => "HA_SNAPSHOT_LOAD_FAILED",
            HaEvent::MasterHeartbeatTimeout => "HA_MASTER_HEARTBEAT_TIMEOUT",
            HaEvent::MasterChangeDetected => "HA_MASTER_CHANGE_DETECTED",
            HaEvent::MasterReasserted => "HA_MASTER_REASSERTED",
            HaEvent::Promoted => "HA_PROMOTED",
            HaEvent::Demoted => "HA_DEMOTED",
            HaEvent::SplitBrainDetected => "HA_SPLIT_BRAIN_DETECTED",
            HaEvent::SplitBrainResolved => "HA_SPLIT_BRAIN_RESOLVED",
            HaEvent::HotStandbyActive => "HA_HOT_STANDBY_ACTIVE",
            HaEvent::WarmStandbyActive => "HA_WARM_STANDBY_ACTIVE",
            HaEvent::StandbyTransitionFailed => "HA_STANDBY_TRANSITION_FAILED",
            HaEvent::MirrorStepFailed => "HA_MIRROR_STEP_FAILED",
            HaEvent::RebindFailed => "HA_REBIND_FAILED",
            HaEvent::PollRegistered => "HA_POLL_REGISTERED",
            HaEvent::PollFailed => "HA_POLL_FAILED",
            HaEvent::PersisterDeltaDropped => "PERSISTER_DELTA_DROPPED",
            HaEvent::PersisterRecordGarbled => "PERSISTER_RECORD_GARBLED",
        }
    }

    /// Default severity for this event.
    pub fn severity(&self) -> Severity {
        match self {
            HaEvent::HeartbeatPublished
            | HaEvent::PollRegistered
            | HaEvent::PersisterDeltaDropped => Severity::Trace,

            HaEvent::Start
            | HaEvent::Stop
            | HaEvent::Disabled
            | HaEvent::ModeChanged
            | HaEvent::MasterChangeDetected
            | HaEvent::Promoted
            | HaEvent::Demoted
            | HaEvent::HotStandbyActive
            | HaEvent::WarmStandbyActive => Severity::Info,

            HaEvent::HeartbeatWriteFailed
            | HaEvent::MasterHeartbeatTimeout
            | HaEvent::MasterReasserted
            | HaEvent::SplitBrainResolved
            | HaEvent::StandbyTransitionFailed
            | HaEvent::MirrorStepFailed
            | HaEvent::PersisterRecordGarbled => Severity::Warn,

            HaEvent::OwnHeartbeatStale
            | HaEvent::SnapshotLoadFailed
            | HaEvent::SplitBrainDetected
            | HaEvent::RebindFailed
            | HaEvent::PollFailed => Severity::Error,
        }
    }

    /// Emit this event at its default severity.
    pub fn emit(&self, fields: &[(&str, &str)]) {
        Logger::log(self.severity(), self.as_str(), fields);
    }
}

impl fmt::Display for HaEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_prefixed() {
        for event in [HaEvent::Start, HaEvent::Promoted, HaEvent::SplitBrainDetected] {
            assert!(event.as_str().starts_with("HA_"));
        }
        assert!(HaEvent::PersisterRecordGarbled.as_str().starts_with("PERSISTER_"));
    }

    #[test]
    fn test_split_brain_is_visible() {
        assert!(HaEvent::SplitBrainDetected.severity() >= Severity::Error);
        assert!(HaEvent::SplitBrainResolved.severity() >= Severity::Warn);
    }

    #[test]
    fn test_heartbeats_are_quiet() {
        assert_eq!(HaEvent::HeartbeatPublished.severity(), Severity::Trace);
    }
}
