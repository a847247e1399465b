//! Sync records
//!
//! A node record is immutable once built; a node builds a fresh one every
//! poll cycle. The plane record is a read-only snapshot: applying a delta
//! produces a new snapshot and leaves the old one untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::delta::{Delta, MasterChange};
use super::state::ManagementNodeState;

/// Version string stamped on records this build publishes
pub const PLATFORM_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One node's last published state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagementNodeSyncRecord {
    pub node_id: String,
    /// `None` when the stored record could not be decoded
    pub status: Option<ManagementNodeState>,
    /// Writer's clock at publication, milliseconds since the epoch
    pub timestamp_utc: i64,
    pub platform_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl ManagementNodeSyncRecord {
    pub fn new(node_id: impl Into<String>, status: ManagementNodeState, timestamp_utc: i64) -> Self {
        Self {
            node_id: node_id.into(),
            status: Some(status),
            timestamp_utc,
            platform_version: PLATFORM_VERSION.to_string(),
            priority: None,
            uri: None,
        }
    }

    /// Record standing in for an entry that could not be decoded.
    pub fn garbled(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            status: None,
            timestamp_utc: 0,
            platform_version: String::new(),
            priority: None,
            uri: None,
        }
    }

    pub fn with_priority(mut self, priority: Option<i64>) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_uri(mut self, uri: Option<String>) -> Self {
        self.uri = uri;
        self
    }

    pub fn with_platform_version(mut self, version: impl Into<String>) -> Self {
        self.platform_version = version.into();
        self
    }

    /// Copy with a different status, keeping the remote timestamp.
    pub fn with_status(&self, status: ManagementNodeState) -> Self {
        Self {
            status: Some(status),
            ..self.clone()
        }
    }

    pub fn has_status(&self, status: ManagementNodeState) -> bool {
        self.status == Some(status)
    }
}

/// Merged view of the whole management plane
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ManagementPlaneSyncRecord {
    master_node_id: Option<String>,
    management_nodes: BTreeMap<String, ManagementNodeSyncRecord>,
}

impl ManagementPlaneSyncRecord {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> ManagementPlaneSyncRecordBuilder {
        ManagementPlaneSyncRecordBuilder::default()
    }

    pub fn master_node_id(&self) -> Option<&str> {
        self.master_node_id.as_deref()
    }

    pub fn management_nodes(&self) -> &BTreeMap<String, ManagementNodeSyncRecord> {
        &self.management_nodes
    }

    pub fn node(&self, node_id: &str) -> Option<&ManagementNodeSyncRecord> {
        self.management_nodes.get(node_id)
    }

    /// Record of the node the master pointer names.
    pub fn master_record(&self) -> Option<&ManagementNodeSyncRecord> {
        self.master_node_id
            .as_deref()
            .and_then(|id| self.management_nodes.get(id))
    }

    /// Ids of every node currently published with `status`.
    pub fn nodes_with_status(&self, status: ManagementNodeState) -> Vec<&str> {
        self.management_nodes
            .values()
            .filter(|r| r.has_status(status))
            .map(|r| r.node_id.as_str())
            .collect()
    }

    /// New snapshot with `delta` applied.
    ///
    /// Records replace any previous record for the same node. A master
    /// pointer left naming an absent node is cleared.
    pub fn apply(&self, delta: &Delta) -> Self {
        let mut next = self.clone();

        for record in &delta.nodes {
            next.management_nodes
                .insert(record.node_id.clone(), record.clone());
        }
        for node_id in &delta.removed_node_ids {
            next.management_nodes.remove(node_id);
        }

        match &delta.master_change {
            MasterChange::NoChange => {}
            MasterChange::SetMaster(node_id) => next.master_node_id = Some(node_id.clone()),
            MasterChange::ClearMaster(node_id) => {
                if next.master_node_id.as_deref() == Some(node_id.as_str()) {
                    next.master_node_id = None;
                }
            }
        }

        next.drop_dangling_master();
        next
    }

    fn drop_dangling_master(&mut self) {
        let dangling = match &self.master_node_id {
            Some(id) => !self.management_nodes.contains_key(id),
            None => false,
        };
        if dangling {
            self.master_node_id = None;
        }
    }
}

/// Builder for [`ManagementPlaneSyncRecord`]
#[derive(Debug, Default)]
pub struct ManagementPlaneSyncRecordBuilder {
    master_node_id: Option<String>,
    management_nodes: BTreeMap<String, ManagementNodeSyncRecord>,
}

impl ManagementPlaneSyncRecordBuilder {
    pub fn master_node_id(mut self, node_id: Option<String>) -> Self {
        self.master_node_id = node_id;
        self
    }

    /// Add or replace a node record.
    pub fn node(mut self, record: ManagementNodeSyncRecord) -> Self {
        self.management_nodes.insert(record.node_id.clone(), record);
        self
    }

    pub fn build(self) -> ManagementPlaneSyncRecord {
        let mut record = ManagementPlaneSyncRecord {
            master_node_id: self.master_node_id,
            management_nodes: self.management_nodes,
        };
        record.drop_dangling_master();
        record
    }
}
