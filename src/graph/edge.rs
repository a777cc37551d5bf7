//! Graph edges: Doc→Entity mentions and typed Entity→Entity relations

use super::ids::{DocId, EntityId, Namespace};
use serde::{Deserialize, Serialize};

/// A Doc→Entity mention edge.
///
/// One per `(doc, entity)` pair within a namespace; re-mentions update
/// `confidence` to the max observed rather than creating a second edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    pub namespace: Namespace,
    pub doc_id: DocId,
    pub entity_id: EntityId,
    pub confidence: f32,
    pub evidence: Option<String>,
}

/// A directed, labeled Entity→Entity edge.
///
/// The label is drawn from the ontology's allowed relations for the source
/// type; direction is canonical — the type that defines the relation in its
/// ontology file is always `source`, never `target`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedEdge {
    pub namespace: Namespace,
    pub source: EntityId,
    pub target: EntityId,
    pub relationship: String,
    pub confidence: f32,
    pub evidence: Option<String>,
}

impl TypedEdge {
    /// Combine two observations of "the same" edge by merge key, taking the
    /// max confidence and preferring the newer evidence when present.
    pub fn combine(self, other: TypedEdge) -> TypedEdge {
        TypedEdge {
            confidence: self.confidence.max(other.confidence),
            evidence: other.evidence.or(self.evidence),
            ..self
        }
    }
}
