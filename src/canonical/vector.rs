//! Vector (embedding) deduplication

use super::embedding::Embedder;
use super::lookup::EntityLookup;
use crate::extraction::{DuplicateMarker, ExtractedEntity};
use crate::graph::Namespace;
use crate::vector::{entry_id, VectorSidecar};
use std::sync::Arc;
use tracing::warn;

pub const DEFAULT_VECTOR_THRESHOLD: f32 = 0.85;

pub struct VectorDedupHook {
    embedder: Arc<dyn Embedder>,
    sidecar: Arc<dyn VectorSidecar>,
    lookup: Arc<dyn EntityLookup>,
    threshold: f32,
    /// Set once embedding/sidecar calls fail; the hook becomes a pass-through
    /// for the rest of the run rather than failing documents.
    disabled: std::sync::atomic::AtomicBool,
}

impl VectorDedupHook {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        sidecar: Arc<dyn VectorSidecar>,
        lookup: Arc<dyn EntityLookup>,
        threshold: f32,
    ) -> Self {
        Self {
            embedder,
            sidecar,
            lookup,
            threshold,
            disabled: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Run over `entities` in place, skipping entries already marked
    /// duplicate by an earlier hook (fuzzy dedup runs first).
    pub fn apply(&self, namespace: &Namespace, entities: &mut [ExtractedEntity]) {
        if self.is_disabled() {
            return;
        }

        for i in 0..entities.len() {
            if entities[i].is_duplicate() {
                continue;
            }
            let entity_type = entities[i].type_id.clone();
            let normalized = entities[i].normalized_name.clone();
            let name = entities[i].name.clone();

            let embedding = match self.embedder.embed(&normalized) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "embedding model unavailable; disabling vector dedup for this run");
                    self.disabled.store(true, std::sync::atomic::Ordering::Relaxed);
                    return;
                }
            };

            let matches = match self
                .sidecar
                .search_similar(&entity_type, namespace, &embedding, 1, self.threshold)
            {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = %e, "vector sidecar unavailable; disabling vector dedup for this run");
                    self.disabled.store(true, std::sync::atomic::Ordering::Relaxed);
                    return;
                }
            };

            if let Some(best) = matches.into_iter().next() {
                match self
                    .lookup
                    .find_by_normalized_name(namespace, &entity_type, &best.normalized_name)
                {
                    Some(id) => {
                        entities[i].duplicate = DuplicateMarker::DuplicateOfGraph(id);
                        continue;
                    }
                    None => {
                        warn!(
                            vector_id = %best.id,
                            "vector match had no corresponding graph entity; treating as new"
                        );
                    }
                }
            }

            let id = entry_id(namespace, &entity_type, &normalized);
            if let Err(e) = self
                .sidecar
                .add_entity(&id, &entity_type, &name, &normalized, namespace, &embedding)
            {
                warn!(error = %e, "failed to persist entity embedding; disabling vector dedup for this run");
                self.disabled.store(true, std::sync::atomic::Ordering::Relaxed);
            }
        }
    }
}
