//! Observability for the HA coordinator
//!
//! - Structured JSON logging with a minimum-severity filter
//! - Typed coordinator events
//! - Per-coordinator counters
//!
//! Observability describes what happened; it never decides what happens,
//! and a failure to emit never changes coordinator behaviour.

mod events;
mod logger;
mod metrics;

pub use events::HaEvent;
pub use logger::{Logger, Severity};
pub use metrics::{HaMetrics, HaMetricsSnapshot};
