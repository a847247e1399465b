//! High availability for the management plane
//!
//! Each management node runs one [`HaCoordinator`]. Nodes never talk to
//! each other directly; they publish [`ManagementNodeSyncRecord`]s through a
//! shared persister and each one independently derives the same master from
//! the same snapshot via a [`MasterChooser`].
//!
//! Lifecycle of a node:
//!
//! ```text
//! INITIALIZING -> STANDBY | WARM_STANDBY | HOT_STANDBY <-> MASTER
//!                                 \            |            /
//!                                  +------> FAILED <------+
//!                  any (except TERMINATED) -> TERMINATED
//! ```

mod chooser;
mod clock;
mod config;
mod coordinator;
mod delta;
mod errors;
mod listener;
mod poller;
mod record;
mod state;

pub use chooser::{
    filter_healthy, infer_failed_nodes, is_fresh, is_heartbeat_ok, AlphabeticMasterChooser,
    MasterChooser, PriorityMasterChooser,
};
pub use clock::{duration_millis, Clock, SystemClock, VirtualClock};
pub use config::{HaConfig, DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_POLL_PERIOD};
pub use coordinator::HaCoordinator;
pub use delta::{Delta, MasterChange};
pub use errors::{HaError, HaErrorKind, HaResult};
pub use listener::PromotionListener;
pub use record::{
    ManagementNodeSyncRecord, ManagementPlaneSyncRecord, ManagementPlaneSyncRecordBuilder,
    PLATFORM_VERSION,
};
pub use state::{HighAvailabilityMode, ManagementNodeState};
