//! Fuzzy deduplication against existing graph entities

use super::lookup::EntityLookup;
use crate::extraction::{DuplicateMarker, ExtractedEntity};
use crate::graph::Namespace;
use std::sync::Arc;
use strsim::jaro_winkler;

pub const DEFAULT_FUZZY_THRESHOLD: f32 = 0.85;

pub struct FuzzyDedupHook {
    lookup: Arc<dyn EntityLookup>,
    threshold: f32,
}

impl FuzzyDedupHook {
    pub fn new(lookup: Arc<dyn EntityLookup>, threshold: f32) -> Self {
        Self { lookup, threshold }
    }

    /// Run over `entities` in place. Entries already marked duplicate are
    /// skipped; list length and index order are never changed.
    pub fn apply(&self, namespace: &Namespace, entities: &mut [ExtractedEntity]) {
        for i in 0..entities.len() {
            if entities[i].is_duplicate() {
                continue;
            }
            let entity_type = entities[i].type_id.clone();
            let normalized = entities[i].normalized_name.clone();
            let candidates = self.lookup.entities_of_type(namespace, &entity_type);

            let best = candidates
                .iter()
                .map(|(id, candidate_norm)| {
                    let score = jaro_winkler(&normalized, candidate_norm) as f32;
                    (score, id.clone())
                })
                .filter(|(score, _)| *score >= self.threshold)
                .max_by(|(score_a, id_a), (score_b, id_b)| {
                    score_a
                        .partial_cmp(score_b)
                        .unwrap()
                        .then_with(|| id_b.as_str().cmp(id_a.as_str()))
                });

            if let Some((_, id)) = best {
                entities[i].duplicate = DuplicateMarker::DuplicateOfGraph(id);
            }
        }
    }
}
