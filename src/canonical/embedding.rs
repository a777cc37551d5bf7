//! Text embedding backends
//!
//! Trait-based so the pipeline can run against `fastembed` in production
//! while tests (and default builds without the `embeddings` feature) use a
//! deterministic hash-based embedder.

use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug)]
pub enum EmbeddingError {
    EmptyInput,
    ModelError(String),
}

impl fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingError::EmptyInput => write!(f, "embedding input was empty"),
            EmbeddingError::ModelError(msg) => write!(f, "embedding model error: {}", msg),
        }
    }
}

impl std::error::Error for EmbeddingError {}

pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
    fn dimension(&self) -> usize;
}

/// Deterministic embedder with no model weights: hashes the text into a
/// fixed-size vector via repeated SHA-256, then L2-normalizes it. Same
/// text always yields the same vector, which is all the dedup pipeline
/// and its tests require; it carries no semantic signal of its own.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        let mut values = Vec::with_capacity(self.dimension);
        let mut seed = text.as_bytes().to_vec();
        while values.len() < self.dimension {
            let digest = Sha256::digest(&seed);
            for byte in digest.iter() {
                if values.len() == self.dimension {
                    break;
                }
                values.push((*byte as f32 / 255.0) * 2.0 - 1.0);
            }
            seed = digest.to_vec();
        }
        let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in values.iter_mut() {
                *v /= norm;
            }
        }
        Ok(values)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(feature = "embeddings")]
mod fastembed_impl {
    use super::{Embedder, EmbeddingError};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    pub struct FastEmbedEmbedder {
        model: Mutex<TextEmbedding>,
        dimension: usize,
    }

    impl FastEmbedEmbedder {
        pub fn new(model: EmbeddingModel, dimension: usize) -> Result<Self, EmbeddingError> {
            let options = InitOptions::new(model).with_show_download_progress(false);
            let embedding = TextEmbedding::try_new(options)
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
            Ok(Self {
                model: Mutex::new(embedding),
                dimension,
            })
        }

        pub fn default_model() -> Result<Self, EmbeddingError> {
            // 768-dim, matches nomic-embed-text-v1.5's output size.
            Self::new(EmbeddingModel::NomicEmbedTextV15, 768)
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let mut model = self.model.lock().unwrap();
            let mut embeddings = model
                .embed(vec![text], None)
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
            embeddings.pop().ok_or(EmbeddingError::EmptyInput)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_yields_same_vector() {
        let embedder = MockEmbedder::new(32);
        let a = embedder.embed("Knowledge Discovery").unwrap();
        let b = embedder.embed("Knowledge Discovery").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn different_text_yields_different_vector() {
        let embedder = MockEmbedder::new(32);
        let a = embedder.embed("Knowledge Discovery").unwrap();
        let b = embedder.embed("Platform Engineering").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_input_is_an_error() {
        let embedder = MockEmbedder::new(32);
        assert!(matches!(embedder.embed(""), Err(EmbeddingError::EmptyInput)));
    }
}
