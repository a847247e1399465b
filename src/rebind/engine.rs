//! Rebind engine contract and the model-store implementation

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::{RebindError, RebindResult};
use super::graph::{apply_change, ResourceGraph};
use super::store::ModelStore;

/// Access mode of a loaded graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebindMode {
    ReadOnly,
    ReadWrite,
}

impl fmt::Display for RebindMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebindMode::ReadOnly => write!(f, "READ_ONLY"),
            RebindMode::ReadWrite => write!(f, "READ_WRITE"),
        }
    }
}

/// Reference to a loaded graph
#[derive(Debug, Clone)]
pub struct RebindHandle {
    graph: Arc<ResourceGraph>,
}

impl RebindHandle {
    pub fn new(graph: Arc<ResourceGraph>) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &Arc<ResourceGraph> {
        &self.graph
    }

    pub fn mode(&self) -> RebindMode {
        self.graph.mode()
    }
}

/// What the coordinator needs from the resource-model layer
pub trait RebindEngine: Send + Sync {
    /// Load the durable model into a new graph.
    fn rebind(&self, mode: RebindMode) -> RebindResult<RebindHandle>;

    /// Incremental catch-up of a read-only mirror; returns changes applied.
    fn mirror_step(&self, handle: &RebindHandle) -> RebindResult<usize>;

    /// Turn a mirror authoritative without reloading.
    fn promote(&self, handle: RebindHandle) -> RebindResult<RebindHandle>;

    /// Detach a graph this node no longer serves.
    fn release(&self, handle: &RebindHandle);

    /// Check the persisted model can be loaded; returns its entity count.
    fn validate_model(&self) -> RebindResult<usize>;
}

/// [`RebindEngine`] over a [`ModelStore`]
#[derive(Clone)]
pub struct ModelRebindEngine {
    store: Arc<dyn ModelStore>,
}

impl fmt::Debug for ModelRebindEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRebindEngine").finish_non_exhaustive()
    }
}

impl ModelRebindEngine {
    pub fn new(store: Arc<dyn ModelStore>) -> Self {
        Self { store }
    }
}

impl RebindEngine for ModelRebindEngine {
    fn rebind(&self, mode: RebindMode) -> RebindResult<RebindHandle> {
        let graph = Arc::new(ResourceGraph::new(Arc::clone(&self.store), mode));
        graph.catch_up()?;
        Ok(RebindHandle::new(graph))
    }

    fn mirror_step(&self, handle: &RebindHandle) -> RebindResult<usize> {
        if !handle.graph.is_read_only() {
            return Err(RebindError::NotAMirror);
        }
        handle.graph.catch_up()
    }

    fn promote(&self, handle: RebindHandle) -> RebindResult<RebindHandle> {
        handle.graph.catch_up()?;
        handle.graph.set_mode(RebindMode::ReadWrite);
        Ok(handle)
    }

    fn release(&self, handle: &RebindHandle) {
        handle.graph.release();
    }

    fn validate_model(&self) -> RebindResult<usize> {
        let changes = self.store.changes_since(0)?;
        let mut entities = Default::default();
        let mut last_seq = 0;

        for entry in &changes {
            if entry.seq <= last_seq {
                return Err(RebindError::InvalidModel(format!(
                    "sequence {} follows {}",
                    entry.seq, last_seq
                )));
            }
            last_seq = entry.seq;
            apply_change(&mut entities, &entry.change);
        }
        Ok(entities.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rebind::{Entity, InMemoryModelStore, ModelChange, SequencedChange};
    use serde_json::json;

    fn engine(store: &InMemoryModelStore) -> ModelRebindEngine {
        ModelRebindEngine::new(Arc::new(store.clone()))
    }

    #[test]
    fn test_rebind_loads_existing_model() {
        let store = InMemoryModelStore::new();
        store
            .append(ModelChange::Upsert {
                entity: Entity::new("db", "database"),
            })
            .unwrap();

        let handle = engine(&store).rebind(RebindMode::ReadWrite).unwrap();
        assert_eq!(handle.mode(), RebindMode::ReadWrite);
        assert!(handle.graph().entity("db").is_some());
    }

    #[test]
    fn test_mirror_step_and_promote() {
        let store = InMemoryModelStore::new();
        let engine = engine(&store);
        let master = engine.rebind(RebindMode::ReadWrite).unwrap();
        let mirror = engine.rebind(RebindMode::ReadOnly).unwrap();

        master.graph().put_entity(Entity::new("a", "app")).unwrap();
        assert_eq!(engine.mirror_step(&mirror).unwrap(), 1);

        master.graph().set_attribute("a", "v", json!(2)).unwrap();
        let promoted = engine.promote(mirror).unwrap();
        assert_eq!(promoted.mode(), RebindMode::ReadWrite);
        assert_eq!(promoted.graph().entity("a").unwrap().attributes["v"], json!(2));

        promoted.graph().put_entity(Entity::new("b", "app")).unwrap();
        assert_eq!(store.latest_seq().unwrap(), 3);
    }

    #[test]
    fn test_mirror_step_requires_mirror() {
        let store = InMemoryModelStore::new();
        let engine = engine(&store);
        let master = engine.rebind(RebindMode::ReadWrite).unwrap();
        assert_eq!(engine.mirror_step(&master).unwrap_err(), RebindError::NotAMirror);
    }

    #[test]
    fn test_release() {
        let store = InMemoryModelStore::new();
        let engine = engine(&store);
        let handle = engine.rebind(RebindMode::ReadOnly).unwrap();
        engine.release(&handle);
        assert!(handle.graph().is_released());
        assert_eq!(engine.mirror_step(&handle).unwrap_err(), RebindError::Released);
    }

    #[test]
    fn test_validate_model() {
        let store = InMemoryModelStore::new();
        store
            .append(ModelChange::Upsert {
                entity: Entity::new("a", "app"),
            })
            .unwrap();
        store
            .append(ModelChange::Upsert {
                entity: Entity::new("b", "app"),
            })
            .unwrap();
        assert_eq!(engine(&store).validate_model().unwrap(), 2);

        store.push_raw(SequencedChange {
            seq: 1,
            change: ModelChange::Remove {
                entity_id: "a".into(),
            },
        });
        assert!(matches!(
            engine(&store).validate_model(),
            Err(RebindError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_rebind_fails_when_store_down() {
        let store = InMemoryModelStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            engine(&store).rebind(RebindMode::ReadWrite),
            Err(RebindError::Store(_))
        ));
    }
}
