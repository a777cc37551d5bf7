//! Hook registry: ordered before_store / after_batch hooks
//!
//! An ordered `Arc<dyn Trait>` list, invoked in registration order, over
//! the canonicalization hook chain.

use super::interactive::{confirm_merge, InteractiveIo, MergeCandidate, MergeDecision};
use crate::canonical::{self, Dictionary};
use crate::extraction::ExtractedEntity;
use crate::graph::Namespace;
use crate::storage::{EntitySummary, GraphStore, StorageResult};
use std::sync::Arc;
use strsim::jaro_winkler;
use tracing::info;

/// A hook applied in place to one document's entity list, in registration
/// order, before graph upsert. Must preserve list length and index order.
pub trait BeforeStoreHook: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, namespace: &Namespace, entities: &mut [ExtractedEntity]);
}

pub struct BasicNormalizationHook;

impl BeforeStoreHook for BasicNormalizationHook {
    fn name(&self) -> &'static str {
        "normalize_basic"
    }

    fn apply(&self, _namespace: &Namespace, entities: &mut [ExtractedEntity]) {
        canonical::apply_basic_normalization(entities);
    }
}

pub struct DictionaryNormalizationHook {
    dictionary: Dictionary,
}

impl DictionaryNormalizationHook {
    pub fn new(dictionary: Dictionary) -> Self {
        Self { dictionary }
    }
}

impl BeforeStoreHook for DictionaryNormalizationHook {
    fn name(&self) -> &'static str {
        "normalize_dictionary"
    }

    fn apply(&self, _namespace: &Namespace, entities: &mut [ExtractedEntity]) {
        canonical::apply_dictionary_normalization(entities, &self.dictionary);
    }
}

impl BeforeStoreHook for canonical::FuzzyDedupHook {
    fn name(&self) -> &'static str {
        "fuzzy_dedup"
    }

    fn apply(&self, namespace: &Namespace, entities: &mut [ExtractedEntity]) {
        canonical::FuzzyDedupHook::apply(self, namespace, entities)
    }
}

impl BeforeStoreHook for canonical::VectorDedupHook {
    fn name(&self) -> &'static str {
        "vector_dedup"
    }

    fn apply(&self, namespace: &Namespace, entities: &mut [ExtractedEntity]) {
        canonical::VectorDedupHook::apply(self, namespace, entities)
    }
}

/// A hook run once after a batch completes, typically global dedup across
/// the namespace the batch just wrote to.
pub trait AfterBatchHook: Send + Sync {
    fn name(&self) -> &'static str;

    /// `interactive_io` is `Some` only when the run was started with
    /// `--interactive`; hooks that have no interactive variant can ignore
    /// it and always take the automatic path.
    fn apply(
        &self,
        store: &dyn GraphStore,
        namespace: &Namespace,
        interactive_io: Option<&mut dyn InteractiveIo>,
    ) -> StorageResult<usize>;
}

/// Global fuzzy dedup across every entity already in the namespace,
/// independent of any one document's batch.
///
/// Non-interactive tie-break: higher degree wins, then longer
/// name, then earlier `created_at`, then lexicographically smaller id.
pub struct GlobalFuzzyDedupHook {
    threshold: f32,
    /// Entity types to scan. The store has no "list distinct types" query,
    /// so the orchestrator passes the ontology pack's type ids at wiring
    /// time (`OntologyPack::types` keys).
    entity_types: Vec<String>,
}

impl GlobalFuzzyDedupHook {
    pub fn new(threshold: f32, entity_types: Vec<String>) -> Self {
        Self { threshold, entity_types }
    }

    fn winner<'a>(a: &'a EntitySummary, b: &'a EntitySummary) -> (&'a EntitySummary, &'a EntitySummary) {
        if a.degree != b.degree {
            return if a.degree > b.degree { (a, b) } else { (b, a) };
        }
        if a.name.len() != b.name.len() {
            return if a.name.len() > b.name.len() { (a, b) } else { (b, a) };
        }
        if a.created_at != b.created_at {
            return if a.created_at < b.created_at { (a, b) } else { (b, a) };
        }
        if a.id.as_str() <= b.id.as_str() {
            (a, b)
        } else {
            (b, a)
        }
    }
}

impl AfterBatchHook for GlobalFuzzyDedupHook {
    fn name(&self) -> &'static str {
        "global_fuzzy_dedup"
    }

    /// Non-interactive: automatic tie-break (higher degree, then
    /// longer name, then earlier `created_at`, then lexicographic id).
    /// Interactive: each candidate pair is presented via `confirm_merge`
    /// and the user's choice of canonical name wins; a skip leaves both
    /// entities alone and the scan moves on to the next pair.
    fn apply(
        &self,
        store: &dyn GraphStore,
        namespace: &Namespace,
        mut interactive_io: Option<&mut dyn InteractiveIo>,
    ) -> StorageResult<usize> {
        let mut merged = 0;
        for entity_type in &self.entity_types {
            let mut summaries = store.entities_of_type_detailed(namespace, entity_type)?;
            let mut i = 0;
            while i < summaries.len() {
                let mut j = i + 1;
                while j < summaries.len() {
                    let score = jaro_winkler(&summaries[i].normalized_name, &summaries[j].normalized_name) as f32;
                    if score >= self.threshold {
                        let merge_pair = match interactive_io.as_deref_mut() {
                            Some(io) => {
                                let candidate = MergeCandidate {
                                    left_id: summaries[i].id.as_str().to_string(),
                                    left_name: summaries[i].name.clone(),
                                    right_id: summaries[j].id.as_str().to_string(),
                                    right_name: summaries[j].name.clone(),
                                    score,
                                };
                                match confirm_merge(io, &candidate) {
                                    MergeDecision::Canonical(id) if id == candidate.left_id => {
                                        Some((summaries[i].id.clone(), summaries[j].id.clone()))
                                    }
                                    MergeDecision::Canonical(_) => {
                                        Some((summaries[j].id.clone(), summaries[i].id.clone()))
                                    }
                                    MergeDecision::Skip => None,
                                }
                            }
                            None => {
                                let (winner, loser) = Self::winner(&summaries[i], &summaries[j]);
                                Some((winner.id.clone(), loser.id.clone()))
                            }
                        };

                        let Some((winner_id, loser_id)) = merge_pair else {
                            j += 1;
                            continue;
                        };
                        store.merge_entities(namespace, &loser_id, &winner_id)?;
                        info!(winner = %winner_id, loser = %loser_id, score, "global fuzzy dedup merge");
                        merged += 1;
                        summaries.retain(|s| s.id != loser_id);
                        continue;
                    }
                    j += 1;
                }
                i += 1;
            }
        }
        Ok(merged)
    }
}

pub struct HookRegistry {
    before_store: Vec<Arc<dyn BeforeStoreHook>>,
    after_batch: Vec<Arc<dyn AfterBatchHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            before_store: Vec::new(),
            after_batch: Vec::new(),
        }
    }

    pub fn register_before_store(&mut self, hook: Arc<dyn BeforeStoreHook>) {
        self.before_store.push(hook);
    }

    pub fn register_after_batch(&mut self, hook: Arc<dyn AfterBatchHook>) {
        self.after_batch.push(hook);
    }

    /// Run every before_store hook in registration order, over the same
    /// entity list, in place.
    pub fn run_before_store(&self, namespace: &Namespace, entities: &mut [ExtractedEntity]) {
        for hook in &self.before_store {
            let before_len = entities.len();
            hook.apply(namespace, entities);
            debug_assert_eq!(
                entities.len(),
                before_len,
                "hook {} must not change the entity list length",
                hook.name()
            );
        }
    }

    pub fn run_after_batch(
        &self,
        store: &dyn GraphStore,
        namespace: &Namespace,
        mut interactive_io: Option<&mut dyn InteractiveIo>,
    ) -> StorageResult<usize> {
        let mut total = 0;
        for hook in &self.after_batch {
            let merged = hook.apply(store, namespace, interactive_io.as_deref_mut())?;
            info!(hook = hook.name(), merged, "after_batch hook completed");
            total += merged;
        }
        Ok(total)
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire the default before_store chain in canonical order:
/// basic normalization → dictionary normalization → fuzzy dedup → vector
/// dedup, followed by global fuzzy dedup as the only default after_batch
/// hook.
#[allow(clippy::too_many_arguments)]
pub fn default_hook_registry(
    dictionary: Dictionary,
    fuzzy: Arc<canonical::FuzzyDedupHook>,
    vector: Option<Arc<canonical::VectorDedupHook>>,
    global_fuzzy_threshold: f32,
    entity_type_ids: Vec<String>,
) -> HookRegistry {
    let mut registry = HookRegistry::new();
    registry.register_before_store(Arc::new(BasicNormalizationHook));
    registry.register_before_store(Arc::new(DictionaryNormalizationHook::new(dictionary)));
    registry.register_before_store(fuzzy);
    if let Some(vector) = vector {
        registry.register_before_store(vector);
    }
    registry.register_after_batch(Arc::new(GlobalFuzzyDedupHook::new(
        global_fuzzy_threshold,
        entity_type_ids,
    )));
    registry
}
