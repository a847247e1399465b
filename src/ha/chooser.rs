//! Master election
//!
//! - One health predicate, [`is_heartbeat_ok`], used everywhere
//! - Choosers are total, deterministic functions of snapshot, timeout and now
//! - Any two nodes reading the same snapshot pick the same master
//!
//! Timestamps are compared against the evaluating node's clock. Hosts are
//! assumed to keep clocks within a small fraction of the heartbeat timeout;
//! skew beyond that shows up as false failure inference, never as two
//! winners for the same snapshot.

use std::time::Duration;

use super::clock::duration_millis;
use super::record::{ManagementNodeSyncRecord, ManagementPlaneSyncRecord};
use super::state::ManagementNodeState;

/// Whether `record` is an election candidate at `now`.
///
/// The status must be MASTER or one of the standby statuses and the
/// heartbeat must satisfy `now - timestamp_utc <= heartbeat_timeout`.
/// A record exactly `heartbeat_timeout` old is still healthy.
pub fn is_heartbeat_ok(
    record: &ManagementNodeSyncRecord,
    heartbeat_timeout: Duration,
    now: i64,
) -> bool {
    match record.status {
        Some(status) if status.is_healthy_status() => is_fresh(record, heartbeat_timeout, now),
        _ => false,
    }
}

/// Timestamp half of [`is_heartbeat_ok`]; ignores the status.
pub fn is_fresh(record: &ManagementNodeSyncRecord, heartbeat_timeout: Duration, now: i64) -> bool {
    now.saturating_sub(record.timestamp_utc) <= duration_millis(heartbeat_timeout)
}

/// Healthy records in node-id order.
pub fn filter_healthy<'a>(
    snapshot: &'a ManagementPlaneSyncRecord,
    heartbeat_timeout: Duration,
    now: i64,
) -> Vec<&'a ManagementNodeSyncRecord> {
    snapshot
        .management_nodes()
        .values()
        .filter(|r| is_heartbeat_ok(r, heartbeat_timeout, now))
        .collect()
}

/// Snapshot with every unhealthy, non-terminal node marked FAILED.
///
/// Derived view only; nothing here is written back to the store.
pub fn infer_failed_nodes(
    snapshot: &ManagementPlaneSyncRecord,
    heartbeat_timeout: Duration,
    now: i64,
) -> ManagementPlaneSyncRecord {
    let mut builder = ManagementPlaneSyncRecord::builder()
        .master_node_id(snapshot.master_node_id().map(str::to_string));

    for record in snapshot.management_nodes().values() {
        let terminal = record.status.map(|s| s.is_terminal()).unwrap_or(false);
        if terminal || is_heartbeat_ok(record, heartbeat_timeout, now) {
            builder = builder.node(record.clone());
        } else {
            builder = builder.node(record.with_status(ManagementNodeState::Failed));
        }
    }
    builder.build()
}

/// Election strategy
pub trait MasterChooser: Send + Sync {
    /// Pick the master among healthy nodes, or `None` when no node is healthy.
    fn choose(
        &self,
        snapshot: &ManagementPlaneSyncRecord,
        heartbeat_timeout: Duration,
        own_node_id: &str,
        now: i64,
    ) -> Option<ManagementNodeSyncRecord>;

    fn name(&self) -> &'static str;
}

/// Smallest node id wins
#[derive(Debug, Clone, Copy, Default)]
pub struct AlphabeticMasterChooser;

impl MasterChooser for AlphabeticMasterChooser {
    fn choose(
        &self,
        snapshot: &ManagementPlaneSyncRecord,
        heartbeat_timeout: Duration,
        _own_node_id: &str,
        now: i64,
    ) -> Option<ManagementNodeSyncRecord> {
        filter_healthy(snapshot, heartbeat_timeout, now)
            .into_iter()
            .min_by(|a, b| a.node_id.cmp(&b.node_id))
            .cloned()
    }

    fn name(&self) -> &'static str {
        "alphabetic"
    }
}

/// Highest priority wins; ties go to the smallest node id.
/// A record without a priority ranks as priority 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityMasterChooser;

impl MasterChooser for PriorityMasterChooser {
    fn choose(
        &self,
        snapshot: &ManagementPlaneSyncRecord,
        heartbeat_timeout: Duration,
        _own_node_id: &str,
        now: i64,
    ) -> Option<ManagementNodeSyncRecord> {
        filter_healthy(snapshot, heartbeat_timeout, now)
            .into_iter()
            .min_by(|a, b| {
                let pa = a.priority.unwrap_or(0);
                let pb = b.priority.unwrap_or(0);
                pb.cmp(&pa).then_with(|| a.node_id.cmp(&b.node_id))
            })
            .cloned()
    }

    fn name(&self) -> &'static str {
        "priority"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ManagementNodeState::*;

    const TIMEOUT: Duration = Duration::from_secs(30);
    const NOW: i64 = 1_000_000;

    fn rec(id: &str, status: ManagementNodeState, ts: i64) -> ManagementNodeSyncRecord {
        ManagementNodeSyncRecord::new(id, status, ts)
    }

    fn plane(records: Vec<ManagementNodeSyncRecord>) -> ManagementPlaneSyncRecord {
        records
            .into_iter()
            .fold(ManagementPlaneSyncRecord::builder(), |b, r| b.node(r))
            .build()
    }

    // =========================================================================
    // HEALTH
    // =========================================================================

    #[test]
    fn test_heartbeat_boundary() {
        let timeout_ms = 30_000;
        assert!(is_heartbeat_ok(&rec("a", Standby, NOW - timeout_ms + 1), TIMEOUT, NOW));
        assert!(is_heartbeat_ok(&rec("a", Standby, NOW - timeout_ms), TIMEOUT, NOW));
        assert!(!is_heartbeat_ok(&rec("a", Standby, NOW - timeout_ms - 1), TIMEOUT, NOW));
    }

    #[test]
    fn test_unhealthy_statuses_excluded() {
        for status in [Initializing, Failed, Terminated] {
            assert!(!is_heartbeat_ok(&rec("a", status, NOW), TIMEOUT, NOW));
        }
        assert!(!is_heartbeat_ok(&ManagementNodeSyncRecord::garbled("a"), TIMEOUT, NOW));
    }

    #[test]
    fn test_future_timestamp_is_healthy() {
        assert!(is_heartbeat_ok(&rec("a", Master, NOW + 5_000), TIMEOUT, NOW));
    }

    #[test]
    fn test_filter_healthy_keeps_order() {
        let snapshot = plane(vec![
            rec("c", Standby, NOW),
            rec("a", HotStandby, NOW),
            rec("b", Failed, NOW),
            rec("d", Standby, NOW - 60_000),
        ]);
        let ids: Vec<_> = filter_healthy(&snapshot, TIMEOUT, NOW)
            .iter()
            .map(|r| r.node_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_infer_failed_nodes() {
        let snapshot = plane(vec![
            rec("a", Master, NOW - 60_000),
            rec("b", Standby, NOW),
            rec("c", Terminated, NOW - 60_000),
            ManagementNodeSyncRecord::garbled("d"),
        ]);
        let inferred = infer_failed_nodes(&snapshot, TIMEOUT, NOW);

        let a = inferred.node("a").unwrap();
        assert_eq!(a.status, Some(Failed));
        assert_eq!(a.timestamp_utc, NOW - 60_000);
        assert_eq!(inferred.node("b").unwrap().status, Some(Standby));
        assert_eq!(inferred.node("c").unwrap().status, Some(Terminated));
        assert_eq!(inferred.node("d").unwrap().status, Some(Failed));
        // stored snapshot untouched
        assert_eq!(snapshot.node("a").unwrap().status, Some(Master));
    }

    // =========================================================================
    // CHOOSERS
    // =========================================================================

    #[test]
    fn test_alphabetic_picks_smallest_healthy() {
        let snapshot = plane(vec![
            rec("b", Standby, NOW),
            rec("a", Standby, NOW - 31_000),
            rec("c", Master, NOW),
        ]);
        let chosen = AlphabeticMasterChooser.choose(&snapshot, TIMEOUT, "c", NOW).unwrap();
        assert_eq!(chosen.node_id, "b");
    }

    #[test]
    fn test_alphabetic_is_independent_of_evaluator() {
        let snapshot = plane(vec![rec("n2", Standby, NOW), rec("n1", Standby, NOW), rec("n3", Standby, NOW)]);
        let winners: Vec<_> = ["n1", "n2", "n3"]
            .iter()
            .map(|own| AlphabeticMasterChooser.choose(&snapshot, TIMEOUT, own, NOW).unwrap().node_id)
            .collect();
        assert_eq!(winners, vec!["n1", "n1", "n1"]);
    }

    #[test]
    fn test_no_healthy_nodes() {
        let snapshot = plane(vec![rec("a", Failed, NOW)]);
        assert!(AlphabeticMasterChooser.choose(&snapshot, TIMEOUT, "a", NOW).is_none());
        assert!(PriorityMasterChooser.choose(&ManagementPlaneSyncRecord::empty(), TIMEOUT, "a", NOW).is_none());
    }

    #[test]
    fn test_priority_prefers_highest_then_id() {
        let snapshot = plane(vec![
            rec("a", Standby, NOW),
            rec("c", Standby, NOW).with_priority(Some(5)),
            rec("b", Standby, NOW).with_priority(Some(5)),
            rec("d", Standby, NOW - 40_000).with_priority(Some(9)),
        ]);
        let chosen = PriorityMasterChooser.choose(&snapshot, TIMEOUT, "a", NOW).unwrap();
        assert_eq!(chosen.node_id, "b");
    }

    #[test]
    fn test_priority_negative_loses_to_unset() {
        let snapshot = plane(vec![
            rec("a", Standby, NOW).with_priority(Some(-1)),
            rec("b", Standby, NOW),
        ]);
        let chosen = PriorityMasterChooser.choose(&snapshot, TIMEOUT, "a", NOW).unwrap();
        assert_eq!(chosen.node_id, "b");
    }
}
