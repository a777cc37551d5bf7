//! The vector sidecar's storage contract

use crate::graph::Namespace;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub entity_type: String,
    pub entity_name: String,
    pub normalized_name: String,
    /// Cosine similarity on the `[0,1]` scale.
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct VectorStats {
    pub namespaces: usize,
    pub vectors: usize,
}

/// One namespaced collection of entity embeddings, searched by cosine
/// nearest-neighbor. The id scheme is deterministic:
/// `f"{namespace}:{entity_type}:{normalized_name}"`.
pub trait VectorSidecar: Send + Sync {
    fn add_entity(
        &self,
        id: &str,
        entity_type: &str,
        entity_name: &str,
        normalized_name: &str,
        namespace: &Namespace,
        embedding: &[f32],
    ) -> Result<(), VectorError>;

    fn search_similar(
        &self,
        entity_type: &str,
        namespace: &Namespace,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<VectorMatch>, VectorError>;

    fn delete_namespace(&self, namespace: &Namespace) -> Result<usize, VectorError>;

    fn stats(&self) -> Result<VectorStats, VectorError>;
}

/// Deterministic sidecar entry id.
pub fn entry_id(namespace: &Namespace, entity_type: &str, normalized_name: &str) -> String {
    format!("{}:{}:{}", namespace.as_str(), entity_type, normalized_name)
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_id_is_deterministic() {
        let ns = Namespace::from_string("acme");
        assert_eq!(entry_id(&ns, "product", "knowledge discovery"), "acme:product:knowledge discovery");
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![0.5, 0.5, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
