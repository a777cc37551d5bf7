//! Storage trait definitions

use crate::extraction::{ExtractedEntity, ExtractedRelation};
use crate::graph::{Document, EntityId, Namespace};
use crate::ontology::OntologyPack;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("entity not found: {0}")]
    EntityNotFound(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Result of upserting one document's extraction result.
#[derive(Debug, Clone, Default)]
pub struct UpsertOutcome {
    pub entities_created: usize,
    pub entities_updated: usize,
    pub mentions_created: usize,
    pub relationships_created: usize,
    pub warnings: Vec<String>,
}

/// Counts returned by a namespace clear, one per datastore.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClearCounts {
    pub nodes_deleted: usize,
    pub edges_deleted: usize,
    /// Embeddings removed from the vector sidecar, if one was configured.
    pub vector_entries_deleted: usize,
}

/// One typed edge as stored, for inspection/testing.
#[derive(Debug, Clone)]
pub struct TypedEdgeSummary {
    pub source: EntityId,
    pub target: EntityId,
    pub relationship: String,
}

/// Graph storage backend for the knowledge graph.
///
/// Implementations must be thread-safe (`Send + Sync`); the orchestrator
/// drives this from a single cooperative loop, but the store's own locking
/// still has to tolerate concurrent readers (queries run alongside writes).
pub trait GraphStore: Send + Sync {
    /// Create schema and indexes if they don't already exist.
    fn init_schema(&self) -> StorageResult<()>;

    /// Look up a document by merge key `(namespace, doc_id)`.
    fn find_document(
        &self,
        namespace: &Namespace,
        doc_id: &str,
    ) -> StorageResult<Option<Document>>;

    /// Upsert a full document batch in a single transaction: upsert the
    /// document, upsert non-duplicate entities, emit MENTIONS to canonical
    /// entities, and upsert typed edges for resolvable relations.
    ///
    /// `ontology` normalizes each relation to the direction its defining
    /// type's markdown file declares, regardless of the index order or
    /// label the extractor emitted; a relation the pack doesn't define is
    /// stored as emitted.
    fn upsert_document_batch(
        &self,
        namespace: &Namespace,
        document: &Document,
        entities: &[ExtractedEntity],
        relations: &[ExtractedRelation],
        ontology: &OntologyPack,
    ) -> StorageResult<UpsertOutcome>;

    /// Merge `from` into `into`: rewrite incident edges, absorb `from`'s
    /// canonical name as an alias of `into`, then delete `from`. Idempotent —
    /// re-applying a merge whose source no longer exists is a no-op.
    fn merge_entities(
        &self,
        namespace: &Namespace,
        from: &EntityId,
        into: &EntityId,
    ) -> StorageResult<()>;

    /// Delete every node and edge in `namespace`.
    fn clear_namespace(&self, namespace: &Namespace) -> StorageResult<ClearCounts>;

    /// All existing entities of `entity_type` in `namespace`: `(id, name,
    /// degree, created_at)`, used by after-batch global dedup tie-breaks.
    fn entities_of_type_detailed(
        &self,
        namespace: &Namespace,
        entity_type: &str,
    ) -> StorageResult<Vec<EntitySummary>>;

    /// Every typed edge stored in `namespace`, for inspection and testing.
    fn typed_edges(&self, namespace: &Namespace) -> StorageResult<Vec<TypedEdgeSummary>>;
}

#[derive(Debug, Clone)]
pub struct EntitySummary {
    pub id: EntityId,
    pub name: String,
    pub normalized_name: String,
    pub degree: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
