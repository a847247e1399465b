//! Store mutations
//!
//! Each node writes only its own record and its own belief about the
//! master, so deltas from different nodes commute well enough for the
//! store to converge regardless of arrival order.

use serde::{Deserialize, Serialize};

use super::record::ManagementNodeSyncRecord;

/// Change to the master pointer carried by a delta
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "node_id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MasterChange {
    /// Leave the master pointer alone
    #[default]
    NoChange,
    /// Point the master at this node
    SetMaster(String),
    /// Clear the master pointer if it still names this node
    ClearMaster(String),
}

/// Unit of mutation sent to a persister
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Delta {
    /// Added or replaced node records
    pub nodes: Vec<ManagementNodeSyncRecord>,
    /// Node ids whose records are removed
    pub removed_node_ids: Vec<String>,
    /// Master pointer change
    pub master_change: MasterChange,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta publishing a single node record.
    pub fn for_node(record: ManagementNodeSyncRecord) -> Self {
        Self::new().with_node(record)
    }

    pub fn with_node(mut self, record: ManagementNodeSyncRecord) -> Self {
        self.nodes.push(record);
        self
    }

    pub fn with_removed_node(mut self, node_id: impl Into<String>) -> Self {
        self.removed_node_ids.push(node_id.into());
        self
    }

    pub fn with_master_change(mut self, change: MasterChange) -> Self {
        self.master_change = change;
        self
    }

    /// Whether applying this delta changes nothing.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.removed_node_ids.is_empty()
            && self.master_change == MasterChange::NoChange
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ha::ManagementNodeState;

    #[test]
    fn test_empty_delta() {
        assert!(Delta::new().is_empty());
        assert!(!Delta::new()
            .with_master_change(MasterChange::SetMaster("a".into()))
            .is_empty());
    }

    #[test]
    fn test_for_node() {
        let record = ManagementNodeSyncRecord::new("a", ManagementNodeState::Standby, 10);
        let delta = Delta::for_node(record.clone());
        assert_eq!(delta.nodes, vec![record]);
        assert_eq!(delta.master_change, MasterChange::NoChange);
    }

    #[test]
    fn test_master_change_serde() {
        let json = serde_json::to_string(&MasterChange::ClearMaster("a".into())).unwrap();
        assert_eq!(json, r#"{"kind":"CLEAR_MASTER","node_id":"a"}"#);
    }
}
