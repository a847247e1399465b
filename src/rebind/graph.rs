//! Live resource graph
//!
//! A graph is either the master's authoritative copy (READ_WRITE) or a
//! hot-standby mirror (READ_ONLY). Mirrors change only by replaying the
//! model store's change log; any direct mutation fails with
//! [`RebindError::ReadOnlyViolation`] and leaves the mirror untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use super::engine::RebindMode;
use super::errors::{RebindError, RebindResult};
use super::store::{ModelChange, ModelStore, SequencedChange};

/// One managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Entity {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

#[derive(Debug)]
struct GraphState {
    entities: BTreeMap<String, Entity>,
    applied_seq: u64,
    mode: RebindMode,
    released: bool,
}

/// In-memory resource graph bound to a model store
pub struct ResourceGraph {
    state: RwLock<GraphState>,
    store: Arc<dyn ModelStore>,
}

impl fmt::Debug for ResourceGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read_state();
        f.debug_struct("ResourceGraph")
            .field("mode", &state.mode)
            .field("entities", &state.entities.len())
            .field("applied_seq", &state.applied_seq)
            .field("released", &state.released)
            .finish()
    }
}

impl ResourceGraph {
    pub(crate) fn new(store: Arc<dyn ModelStore>, mode: RebindMode) -> Self {
        Self {
            state: RwLock::new(GraphState {
                entities: BTreeMap::new(),
                applied_seq: 0,
                mode,
                released: false,
            }),
            store,
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, GraphState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, GraphState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn mode(&self) -> RebindMode {
        self.read_state().mode
    }

    pub fn is_read_only(&self) -> bool {
        self.mode() == RebindMode::ReadOnly
    }

    pub fn is_released(&self) -> bool {
        self.read_state().released
    }

    /// Sequence number of the last change reflected in this graph.
    pub fn applied_seq(&self) -> u64 {
        self.read_state().applied_seq
    }

    pub fn entity(&self, id: &str) -> Option<Entity> {
        self.read_state().entities.get(id).cloned()
    }

    pub fn entities(&self) -> Vec<Entity> {
        self.read_state().entities.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read_state().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // MUTATIONS (READ_WRITE only)
    // =========================================================================

    /// Insert or replace an entity.
    pub fn put_entity(&self, entity: Entity) -> RebindResult<()> {
        let what = format!("put_entity '{}'", entity.id);
        self.mutate(&what, ModelChange::Upsert { entity })
    }

    /// Set one attribute of an existing entity.
    pub fn set_attribute(
        &self,
        entity_id: &str,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> RebindResult<()> {
        let key = key.into();
        let what = format!("set_attribute '{}.{}'", entity_id, key);
        {
            let state = self.read_state();
            if state.mode == RebindMode::ReadWrite && !state.entities.contains_key(entity_id) {
                return Err(RebindError::EntityNotFound(entity_id.to_string()));
            }
        }
        self.mutate(
            &what,
            ModelChange::SetAttribute {
                entity_id: entity_id.to_string(),
                key,
                value,
            },
        )
    }

    /// Remove an existing entity.
    pub fn remove_entity(&self, entity_id: &str) -> RebindResult<()> {
        let what = format!("remove_entity '{}'", entity_id);
        {
            let state = self.read_state();
            if state.mode == RebindMode::ReadWrite && !state.entities.contains_key(entity_id) {
                return Err(RebindError::EntityNotFound(entity_id.to_string()));
            }
        }
        self.mutate(
            &what,
            ModelChange::Remove {
                entity_id: entity_id.to_string(),
            },
        )
    }

    fn mutate(&self, what: &str, change: ModelChange) -> RebindResult<()> {
        let mut state = self.write_state();
        if state.released {
            return Err(RebindError::Released);
        }
        if state.mode == RebindMode::ReadOnly {
            return Err(RebindError::ReadOnlyViolation(what.to_string()));
        }

        let seq = self.store.append(change.clone())?;
        apply_change(&mut state.entities, &change);
        state.applied_seq = seq;
        Ok(())
    }

    // =========================================================================
    // ENGINE HOOKS
    // =========================================================================

    /// Replay store changes newer than `applied_seq`; returns how many applied.
    pub(crate) fn catch_up(&self) -> RebindResult<usize> {
        let after = {
            let state = self.read_state();
            if state.released {
                return Err(RebindError::Released);
            }
            state.applied_seq
        };

        let changes = self.store.changes_since(after)?;

        let mut state = self.write_state();
        let mut applied = 0;
        for SequencedChange { seq, change } in changes {
            // another catch-up may have raced ahead
            if seq <= state.applied_seq {
                continue;
            }
            apply_change(&mut state.entities, &change);
            state.applied_seq = seq;
            applied += 1;
        }
        Ok(applied)
    }

    pub(crate) fn set_mode(&self, mode: RebindMode) {
        self.write_state().mode = mode;
    }

    pub(crate) fn release(&self) {
        let mut state = self.write_state();
        state.released = true;
        state.entities.clear();
    }
}

/// Apply one change to an entity map. Changes to missing entities are no-ops.
pub(crate) fn apply_change(entities: &mut BTreeMap<String, Entity>, change: &ModelChange) {
    match change {
        ModelChange::Upsert { entity } => {
            entities.insert(entity.id.clone(), entity.clone());
        }
        ModelChange::SetAttribute {
            entity_id,
            key,
            value,
        } => {
            if let Some(entity) = entities.get_mut(entity_id) {
                entity.attributes.insert(key.clone(), value.clone());
            }
        }
        ModelChange::Remove { entity_id } => {
            entities.remove(entity_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rebind::InMemoryModelStore;
    use serde_json::json;

    fn graph(store: &InMemoryModelStore, mode: RebindMode) -> ResourceGraph {
        ResourceGraph::new(Arc::new(store.clone()), mode)
    }

    #[test]
    fn test_read_write_graph_writes_through() {
        let store = InMemoryModelStore::new();
        let master = graph(&store, RebindMode::ReadWrite);

        master.put_entity(Entity::new("web-1", "server")).unwrap();
        master.set_attribute("web-1", "port", json!(8080)).unwrap();

        assert_eq!(store.latest_seq().unwrap(), 2);
        assert_eq!(master.applied_seq(), 2);
        assert_eq!(master.entity("web-1").unwrap().attributes["port"], json!(8080));
    }

    #[test]
    fn test_read_only_rejects_every_mutation() {
        let store = InMemoryModelStore::new();
        let mirror = graph(&store, RebindMode::ReadOnly);

        let errors = [
            mirror.put_entity(Entity::new("x", "server")).unwrap_err(),
            mirror.set_attribute("x", "port", json!(1)).unwrap_err(),
            mirror.remove_entity("x").unwrap_err(),
        ];
        for err in errors {
            assert!(matches!(err, RebindError::ReadOnlyViolation(_)));
            assert!(err.to_string().contains("read-only"));
        }
        assert_eq!(store.latest_seq().unwrap(), 0);
        assert!(mirror.is_empty());
    }

    #[test]
    fn test_catch_up_replays_new_changes_only() {
        let store = InMemoryModelStore::new();
        let master = graph(&store, RebindMode::ReadWrite);
        let mirror = graph(&store, RebindMode::ReadOnly);

        master.put_entity(Entity::new("a", "app")).unwrap();
        assert_eq!(mirror.catch_up().unwrap(), 1);
        assert_eq!(mirror.catch_up().unwrap(), 0);

        master.set_attribute("a", "state", json!("running")).unwrap();
        master.put_entity(Entity::new("b", "app")).unwrap();
        assert_eq!(mirror.catch_up().unwrap(), 2);
        assert_eq!(mirror.entities(), master.entities());
    }

    #[test]
    fn test_missing_entity_on_master() {
        let store = InMemoryModelStore::new();
        let master = graph(&store, RebindMode::ReadWrite);
        assert_eq!(
            master.remove_entity("ghost").unwrap_err(),
            RebindError::EntityNotFound("ghost".into())
        );
        assert_eq!(store.latest_seq().unwrap(), 0);
    }

    #[test]
    fn test_released_graph() {
        let store = InMemoryModelStore::new();
        let master = graph(&store, RebindMode::ReadWrite);
        master.put_entity(Entity::new("a", "app")).unwrap();
        master.release();

        assert!(master.is_released());
        assert!(master.is_empty());
        assert_eq!(
            master.put_entity(Entity::new("b", "app")).unwrap_err(),
            RebindError::Released
        );
        assert_eq!(master.catch_up().unwrap_err(), RebindError::Released);
    }

    #[test]
    fn test_store_failure_leaves_graph_unchanged() {
        let store = InMemoryModelStore::new();
        let master = graph(&store, RebindMode::ReadWrite);
        store.set_unavailable(true);
        assert!(master.put_entity(Entity::new("a", "app")).is_err());
        assert!(master.is_empty());
    }
}
