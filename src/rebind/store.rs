//! Durable resource model
//!
//! The model is a sequenced change log. Sequence numbers start at 1 and
//! increase by one per appended change; replaying from 0 rebuilds the graph.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::errors::{RebindError, RebindResult};
use super::graph::Entity;

/// One mutation of the resource model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ModelChange {
    Upsert { entity: Entity },
    SetAttribute {
        entity_id: String,
        key: String,
        value: serde_json::Value,
    },
    Remove { entity_id: String },
}

impl ModelChange {
    pub fn entity_id(&self) -> &str {
        match self {
            ModelChange::Upsert { entity } => &entity.id,
            ModelChange::SetAttribute { entity_id, .. } => entity_id,
            ModelChange::Remove { entity_id } => entity_id,
        }
    }
}

/// A change with its position in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedChange {
    pub seq: u64,
    pub change: ModelChange,
}

/// Storage for the resource model change log
pub trait ModelStore: Send + Sync {
    /// Changes with `seq > after`, in order.
    fn changes_since(&self, after: u64) -> RebindResult<Vec<SequencedChange>>;

    /// Append a change and return its sequence number.
    fn append(&self, change: ModelChange) -> RebindResult<u64>;

    fn latest_seq(&self) -> RebindResult<u64>;
}

/// Shared in-memory change log; clones refer to the same log
#[derive(Debug, Clone, Default)]
pub struct InMemoryModelStore {
    log: Arc<RwLock<Vec<SequencedChange>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`RebindError::Store`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Append a raw entry, bypassing sequence assignment.
    pub fn push_raw(&self, entry: SequencedChange) {
        self.log
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }

    fn check_available(&self) -> RebindResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RebindError::Store("model store unavailable".into()))
        } else {
            Ok(())
        }
    }
}

impl ModelStore for InMemoryModelStore {
    fn changes_since(&self, after: u64) -> RebindResult<Vec<SequencedChange>> {
        self.check_available()?;
        let log = self.log.read().unwrap_or_else(|e| e.into_inner());
        Ok(log.iter().filter(|c| c.seq > after).cloned().collect())
    }

    fn append(&self, change: ModelChange) -> RebindResult<u64> {
        self.check_available()?;
        let mut log = self.log.write().unwrap_or_else(|e| e.into_inner());
        let seq = log.last().map(|c| c.seq).unwrap_or(0) + 1;
        log.push(SequencedChange { seq, change });
        Ok(seq)
    }

    fn latest_seq(&self) -> RebindResult<u64> {
        self.check_available()?;
        let log = self.log.read().unwrap_or_else(|e| e.into_inner());
        Ok(log.last().map(|c| c.seq).unwrap_or(0))
    }
}
