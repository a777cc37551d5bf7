//! Read-only graph access the canonicalization hooks need
//!
//! Defined here rather than in `storage` so this module has no dependency
//! on the storage crate; `storage::SqliteGraphStore` implements this trait.

use crate::graph::{EntityId, Namespace};

pub trait EntityLookup: Send + Sync {
    /// All existing entities of `entity_type` in `namespace`, as
    /// `(id, normalized_name)` pairs, for fuzzy comparison.
    fn entities_of_type(&self, namespace: &Namespace, entity_type: &str) -> Vec<(EntityId, String)>;

    /// Exact merge-key lookup, used to resolve a vector-sidecar hit back
    /// to a graph entity id.
    fn find_by_normalized_name(
        &self,
        namespace: &Namespace,
        entity_type: &str,
        normalized_name: &str,
    ) -> Option<EntityId>;
}

/// In-memory lookup for tests.
#[derive(Default)]
pub struct InMemoryLookup {
    entities: Vec<(Namespace, String, EntityId, String)>,
}

impl InMemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, namespace: Namespace, entity_type: impl Into<String>, id: EntityId, normalized_name: impl Into<String>) {
        self.entities.push((namespace, entity_type.into(), id, normalized_name.into()));
    }
}

impl EntityLookup for InMemoryLookup {
    fn entities_of_type(&self, namespace: &Namespace, entity_type: &str) -> Vec<(EntityId, String)> {
        self.entities
            .iter()
            .filter(|(ns, ty, _, _)| ns == namespace && ty == entity_type)
            .map(|(_, _, id, name)| (id.clone(), name.clone()))
            .collect()
    }

    fn find_by_normalized_name(
        &self,
        namespace: &Namespace,
        entity_type: &str,
        normalized_name: &str,
    ) -> Option<EntityId> {
        self.entities
            .iter()
            .find(|(ns, ty, _, name)| ns == namespace && ty == entity_type && name == normalized_name)
            .map(|(_, _, id, _)| id.clone())
    }
}
