//! Sync record persistence
//!
//! The persister is the only boundary between coordinators on different
//! nodes. Each node writes its own record and its own belief about the
//! master; every node reads back the merged plane record.
//!
//! Contract:
//! - `load_sync_record` fails when the persister is not running
//! - `delta` on a stopped persister drops the delta and returns `Ok`
//! - `wait_for_writes_completed` blocks until earlier deltas are visible

mod errors;
mod file;
mod memory;

use std::time::Duration;

use crate::ha::{Delta, ManagementPlaneSyncRecord};

pub use errors::{PersistenceError, PersistenceResult};
pub use file::{ChangeLogEntry, FilePersister};
pub use memory::{InMemoryPersister, InMemoryPlaneStore};

/// Read/write contract for the shared plane record
pub trait SyncRecordPersister: Send + Sync {
    /// Load the merged plane record.
    fn load_sync_record(&self) -> PersistenceResult<ManagementPlaneSyncRecord>;

    /// Apply a delta. Best-effort: a stopped persister drops it silently.
    fn delta(&self, delta: &Delta) -> PersistenceResult<()>;

    /// Block until earlier deltas are visible or `timeout` elapses.
    fn wait_for_writes_completed(&self, timeout: Duration) -> PersistenceResult<()>;

    fn stop(&self);

    fn is_running(&self) -> bool;
}
