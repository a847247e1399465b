//! aeroplane - deterministic high availability for a management plane
//!
//! Every management node runs an [`ha::HaCoordinator`]. Coordinators share
//! nothing but a [`persist::SyncRecordPersister`]; each one publishes its own
//! heartbeat record, reads the merged plane record back and reaches the same
//! master decision as every other node reading the same snapshot.

pub mod cli;
pub mod ha;
pub mod http;
pub mod observability;
pub mod persist;
pub mod rebind;
