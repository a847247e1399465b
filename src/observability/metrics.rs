//! HA coordinator counters
//!
//! - Counters only, monotonic
//! - Reset only when the coordinator is constructed
//! - Relaxed atomics; exact values, eventually visible

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters owned by one coordinator instance
#[derive(Debug, Default)]
pub struct HaMetrics {
    heartbeats_published: AtomicU64,
    heartbeat_write_failures: AtomicU64,
    snapshot_load_failures: AtomicU64,
    elections: AtomicU64,
    promotions: AtomicU64,
    demotions: AtomicU64,
    split_brain_detected: AtomicU64,
    mirror_steps: AtomicU64,
}

/// Point-in-time copy of [`HaMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaMetricsSnapshot {
    pub heartbeats_published: u64,
    pub heartbeat_write_failures: u64,
    pub snapshot_load_failures: u64,
    pub elections: u64,
    pub promotions: u64,
    pub demotions: u64,
    pub split_brain_detected: u64,
    pub mirror_steps: u64,
}

impl HaMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_heartbeats_published(&self) {
        self.heartbeats_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_heartbeat_write_failures(&self) {
        self.heartbeat_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_snapshot_load_failures(&self) {
        self.snapshot_load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_elections(&self) {
        self.elections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_promotions(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_demotions(&self) {
        self.demotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_split_brain_detected(&self) {
        self.split_brain_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_mirror_steps(&self) {
        self.mirror_steps.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of times this node promoted itself.
    pub fn promotions(&self) -> u64 {
        self.promotions.load(Ordering::Relaxed)
    }

    /// Number of times this node demoted itself.
    pub fn demotions(&self) -> u64 {
        self.demotions.load(Ordering::Relaxed)
    }

    /// Take a consistent-enough copy of every counter.
    pub fn snapshot(&self) -> HaMetricsSnapshot {
        HaMetricsSnapshot {
            heartbeats_published: self.heartbeats_published.load(Ordering::Relaxed),
            heartbeat_write_failures: self.heartbeat_write_failures.load(Ordering::Relaxed),
            snapshot_load_failures: self.snapshot_load_failures.load(Ordering::Relaxed),
            elections: self.elections.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            demotions: self.demotions.load(Ordering::Relaxed),
            split_brain_detected: self.split_brain_detected.load(Ordering::Relaxed),
            mirror_steps: self.mirror_steps.load(Ordering::Relaxed),
        }
    }

    /// Export as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = HaMetrics::new();
        assert_eq!(metrics.snapshot(), HaMetricsSnapshot::default());
    }

    #[test]
    fn test_concurrent_increments() {
        let metrics = Arc::new(HaMetrics::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let m = Arc::clone(&metrics);
            handles.push(thread::spawn(move || {
                for _ in 0..250 {
                    m.increment_heartbeats_published();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(metrics.snapshot().heartbeats_published, 1000);
    }

    #[test]
    fn test_to_json() {
        let metrics = HaMetrics::new();
        metrics.increment_promotions();
        let json = metrics.to_json();
        assert_eq!(json["promotions"], 1);
        assert_eq!(json["demotions"], 0);
    }
}
