//! Canonicalization pipeline: the `before_store` hook chain
//!
//! Hooks run in registration order, in place, over the per-document entity
//! list, and never reorder or remove entries — relation indices from the
//! extraction step must keep resolving to the same logical slots.

mod basic;
mod dictionary;
mod embedding;
mod fuzzy;
mod lookup;
mod vector;

pub use basic::normalize_basic;
pub use dictionary::Dictionary;
pub use embedding::{Embedder, EmbeddingError, MockEmbedder};
pub use fuzzy::{FuzzyDedupHook, DEFAULT_FUZZY_THRESHOLD};
pub use lookup::{EntityLookup, InMemoryLookup};
pub use vector::{VectorDedupHook, DEFAULT_VECTOR_THRESHOLD};

#[cfg(feature = "embeddings")]
pub use embedding::FastEmbedEmbedder;

use crate::extraction::ExtractedEntity;

/// Lowercase, strip parens, strip punctuation, collapse whitespace.
/// Writes `normalized_name`; `name` is preserved for display/aliasing.
pub fn apply_basic_normalization(entities: &mut [ExtractedEntity]) {
    for entity in entities.iter_mut() {
        entity.normalized_name = normalize_basic(&entity.name);
    }
}

/// If the normalized name matches a dictionary key, rewrite `name`
/// to the canonical expansion and re-run basic normalization on it.
pub fn apply_dictionary_normalization(entities: &mut [ExtractedEntity], dict: &Dictionary) {
    for entity in entities.iter_mut() {
        if let Some(expansion) = dict.expand(&entity.normalized_name) {
            entity.name = expansion.to_string();
            entity.normalized_name = normalize_basic(&entity.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str) -> ExtractedEntity {
        ExtractedEntity::new("product", name)
    }

    #[test]
    fn basic_normalization_preserves_list_length_and_order() {
        let mut entities = vec![entity("Alpha"), entity("Beta (Inc)"), entity("Gamma!")];
        apply_basic_normalization(&mut entities);
        assert_eq!(entities.len(), 3);
        assert_eq!(entities[0].normalized_name, "alpha");
        assert_eq!(entities[1].normalized_name, "beta");
        assert_eq!(entities[2].normalized_name, "gamma");
        // `name` untouched by basic normalization.
        assert_eq!(entities[0].name, "Alpha");
    }

    #[test]
    fn dictionary_normalization_rewrites_name_and_renormalizes() {
        let mut entities = vec![entity("KD")];
        apply_basic_normalization(&mut entities);
        assert_eq!(entities[0].normalized_name, "kd");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dict.txt");
        std::fs::write(&path, "KD : Knowledge Discovery\n").unwrap();
        let dict = Dictionary::load(&path);

        apply_dictionary_normalization(&mut entities, &dict);
        assert_eq!(entities[0].name, "Knowledge Discovery");
        assert_eq!(entities[0].normalized_name, "knowledge discovery");
    }
}
