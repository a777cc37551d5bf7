//! Run configuration
//!
//! Not a YAML config loader — a small struct assembled from CLI
//! flags and environment variables, CLI taking precedence over env, env
//! over the built-in defaults.

use crate::canonical::{DEFAULT_FUZZY_THRESHOLD, DEFAULT_VECTOR_THRESHOLD};
use crate::graph::Namespace;
use std::path::PathBuf;
use std::time::Duration;

/// Default consecutive-failure threshold before the orchestrator aborts
/// the run with exit code 2.
pub const DEFAULT_MAX_FAILURES: u32 = 10;

/// Default per-call LLM timeout.
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(30);

/// Default document-body budget, in characters, before the truncation
/// policy kicks in. Conservative relative to typical 128k-token
/// context windows, leaving headroom for the ontology prompt and the
/// model's completion.
pub const DEFAULT_MAX_DOCUMENT_CHARS: usize = 100_000;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub namespace: Namespace,
    pub source: PathBuf,
    pub entities_dir: PathBuf,
    pub prompt_template_file: PathBuf,
    pub dictionary_file: Option<PathBuf>,
    pub graph_db_path: Option<PathBuf>,
    pub vector_db_path: Option<PathBuf>,
    pub dry_run: bool,
    pub refresh: bool,
    pub interactive: bool,
    pub skip_processed: bool,
    pub max_batch_docs: Option<usize>,
    pub max_failures: u32,
    pub min_confidence: f32,
    pub fuzzy_threshold: f32,
    pub vector_threshold: f32,
    pub llm_timeout: Duration,
    pub max_document_chars: usize,
}

impl RunConfig {
    /// CLI-provided overrides layered over environment variables layered
    /// over these defaults.
    pub fn new(namespace: Namespace, source: PathBuf, entities_dir: PathBuf, prompt_template_file: PathBuf) -> Self {
        Self {
            namespace,
            source,
            entities_dir,
            prompt_template_file,
            dictionary_file: None,
            graph_db_path: None,
            vector_db_path: None,
            dry_run: false,
            refresh: false,
            interactive: false,
            skip_processed: true,
            max_batch_docs: None,
            max_failures: env_u32("MAX_FAILURES").unwrap_or(DEFAULT_MAX_FAILURES),
            min_confidence: 0.0,
            fuzzy_threshold: env_f32("FUZZY_THRESHOLD").unwrap_or(DEFAULT_FUZZY_THRESHOLD),
            vector_threshold: env_f32("VECTOR_THRESHOLD").unwrap_or(DEFAULT_VECTOR_THRESHOLD),
            llm_timeout: DEFAULT_LLM_TIMEOUT,
            max_document_chars: env_usize("MAX_DOCUMENT_CHARS").unwrap_or(DEFAULT_MAX_DOCUMENT_CHARS),
        }
    }
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_f32(key: &str) -> Option<f32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_thresholds() {
        let cfg = RunConfig::new(
            Namespace::default(),
            PathBuf::from("corpus"),
            PathBuf::from("entities"),
            PathBuf::from("prompt_template.md"),
        );
        assert_eq!(cfg.max_failures, DEFAULT_MAX_FAILURES);
        assert!((cfg.fuzzy_threshold - DEFAULT_FUZZY_THRESHOLD).abs() < f32::EPSILON);
        assert!((cfg.vector_threshold - DEFAULT_VECTOR_THRESHOLD).abs() < f32::EPSILON);
        assert!(cfg.skip_processed);
    }
}
