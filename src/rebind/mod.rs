//! Rebind engine
//!
//! Loads the durable resource model into a live [`ResourceGraph`]:
//! - READ_WRITE graphs belong to the master and write through to the store
//! - READ_ONLY graphs are hot-standby mirrors: they reject every mutation
//!   and catch up incrementally from the store's change sequence
//! - promoting a mirror catches it up and flips it to READ_WRITE in place

mod engine;
mod errors;
mod graph;
mod store;

pub use engine::{ModelRebindEngine, RebindEngine, RebindHandle, RebindMode};
pub use errors::{RebindError, RebindResult};
pub use graph::{Entity, ResourceGraph};
pub use store::{InMemoryModelStore, ModelChange, ModelStore, SequencedChange};
