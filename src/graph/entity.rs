//! Entity: one node per logical real-world thing within a namespace

use super::ids::{EntityId, Namespace};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A canonical entity persisted in the graph.
///
/// Merge key is `(namespace, entity_type, normalized_name)`; `id` is an
/// internal surrogate key used by edges, not the identity the store
/// deduplicates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub namespace: Namespace,
    pub entity_type: String,
    pub name: String,
    pub normalized_name: String,
    pub aliases: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(
        namespace: Namespace,
        entity_type: impl Into<String>,
        name: impl Into<String>,
        normalized_name: impl Into<String>,
    ) -> Self {
        Self {
            id: EntityId::new(),
            namespace,
            entity_type: entity_type.into(),
            name: name.into(),
            normalized_name: normalized_name.into(),
            aliases: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    /// The merge key this entity dedups on.
    pub fn merge_key(&self) -> (Namespace, String, String) {
        (
            self.namespace.clone(),
            self.entity_type.clone(),
            self.normalized_name.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_key_is_namespace_type_and_normalized_name() {
        let e = Entity::new(
            Namespace::from_string("acme"),
            "product",
            "Knowledge Discovery",
            "knowledge discovery",
        );
        assert_eq!(
            e.merge_key(),
            (
                Namespace::from_string("acme"),
                "product".to_string(),
                "knowledge discovery".to_string()
            )
        );
    }
}
