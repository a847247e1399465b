//! In-memory persister
//!
//! One [`InMemoryPlaneStore`] stands in for the shared object store; each
//! node gets its own [`InMemoryPersister`] over it. Per-node fault switches
//! model a node whose writes are lost or whose store is unreachable.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use super::errors::{PersistenceError, PersistenceResult};
use super::SyncRecordPersister;
use crate::ha::{Delta, ManagementPlaneSyncRecord};
use crate::observability::HaEvent;

/// Shared plane record; clones refer to the same store
#[derive(Debug, Clone, Default)]
pub struct InMemoryPlaneStore {
    inner: Arc<RwLock<StoreInner>>,
}

#[derive(Debug, Default)]
struct StoreInner {
    snapshot: Arc<ManagementPlaneSyncRecord>,
    applied_deltas: u64,
}

impl InMemoryPlaneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current merged record.
    pub fn snapshot(&self) -> ManagementPlaneSyncRecord {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        ManagementPlaneSyncRecord::clone(&inner.snapshot)
    }

    /// Replace the current record with `delta` applied.
    pub fn apply(&self, delta: &Delta) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let next = inner.snapshot.apply(delta);
        inner.snapshot = Arc::new(next);
        inner.applied_deltas += 1;
    }

    /// Number of deltas applied so far.
    pub fn applied_deltas(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .applied_deltas
    }
}

/// One node's view of an [`InMemoryPlaneStore`]
#[derive(Debug)]
pub struct InMemoryPersister {
    store: InMemoryPlaneStore,
    running: AtomicBool,
    writes_fail_silently: AtomicBool,
    writes_fail: AtomicBool,
    loads_fail: AtomicBool,
    dropped_writes: AtomicU64,
}

impl InMemoryPersister {
    pub fn new(store: InMemoryPlaneStore) -> Self {
        Self {
            store,
            running: AtomicBool::new(true),
            writes_fail_silently: AtomicBool::new(false),
            writes_fail: AtomicBool::new(false),
            loads_fail: AtomicBool::new(false),
            dropped_writes: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &InMemoryPlaneStore {
        &self.store
    }

    /// Drop deltas while reporting success.
    pub fn set_writes_fail_silently(&self, fail: bool) {
        self.writes_fail_silently.store(fail, Ordering::SeqCst);
    }

    /// Reject deltas with [`PersistenceError::Unavailable`].
    pub fn set_writes_fail(&self, fail: bool) {
        self.writes_fail.store(fail, Ordering::SeqCst);
    }

    /// Reject loads with [`PersistenceError::Unavailable`].
    pub fn set_loads_fail(&self, fail: bool) {
        self.loads_fail.store(fail, Ordering::SeqCst);
    }

    /// Deltas discarded by silent failure or after stop.
    pub fn dropped_writes(&self) -> u64 {
        self.dropped_writes.load(Ordering::SeqCst)
    }
}

impl SyncRecordPersister for InMemoryPersister {
    fn load_sync_record(&self) -> PersistenceResult<ManagementPlaneSyncRecord> {
        if !self.is_running() {
            return Err(PersistenceError::NotRunning);
        }
        if self.loads_fail.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("store unreachable".into()));
        }
        Ok(self.store.snapshot())
    }

    fn delta(&self, delta: &Delta) -> PersistenceResult<()> {
        if !self.is_running() {
            self.dropped_writes.fetch_add(1, Ordering::SeqCst);
            HaEvent::PersisterDeltaDropped.emit(&[("reason", "not running")]);
            return Ok(());
        }
        if self.writes_fail.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("store unreachable".into()));
        }
        if self.writes_fail_silently.load(Ordering::SeqCst) {
            self.dropped_writes.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
        self.store.apply(delta);
        Ok(())
    }

    fn wait_for_writes_completed(&self, _timeout: Duration) -> PersistenceResult<()> {
        // Deltas are applied synchronously.
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
