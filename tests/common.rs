use std::path::{Path, PathBuf};
use std::time::Duration;

use corpus_forge::config::RunConfig;
use corpus_forge::extraction::{LlmExtractor, MockProvider, ProviderResponse};
use corpus_forge::graph::Namespace;
use corpus_forge::ontology::OntologyLoader;
use corpus_forge::orchestrator::{cancellation_flag, default_hook_registry, run_pipeline, RunOutcome};
use corpus_forge::storage::SqliteStore;

pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

pub fn ontology_dir() -> PathBuf {
    fixtures_dir().join("ontology")
}

pub fn prompt_template_path() -> PathBuf {
    fixtures_dir().join("prompt_template.md")
}

/// Write one `<stem>.html` file into `dir` with the given title and body text.
pub fn write_doc(dir: &Path, stem: &str, title: &str, body: &str) {
    let html = format!(
        "<html><head><title>{title}</title></head><body><p>{body}</p></body></html>"
    );
    std::fs::write(dir.join(format!("{stem}.html")), html).unwrap();
}

/// Build a `RunConfig` pointed at `source`, using the shared ontology/prompt fixtures.
pub fn config_for(namespace: &str, source: PathBuf) -> RunConfig {
    RunConfig::new(
        Namespace::from_string(namespace),
        source,
        ontology_dir(),
        prompt_template_path(),
    )
}

/// Run the pipeline with a scripted provider returning `responses` in order
/// (one per document, in sorted-path order) against a fresh in-memory store.
pub async fn run_with_responses(config: &RunConfig, responses: Vec<&str>) -> (RunOutcome, SqliteStore) {
    let store = SqliteStore::open_in_memory().unwrap();
    let ontology = OntologyLoader::load(&config.entities_dir).unwrap();
    let prompt_template = std::fs::read_to_string(&config.prompt_template_file).unwrap();

    let provider = MockProvider::new(
        responses
            .into_iter()
            .map(|r| Ok(ProviderResponse {
                text: r.to_string(),
                prompt_tokens: Some(10),
                completion_tokens: Some(5),
            }))
            .collect(),
    );
    let extractor = LlmExtractor::new(Box::new(provider), Duration::from_secs(5));

    let hooks = default_hook_registry(
        corpus_forge::canonical::Dictionary::empty(),
        std::sync::Arc::new(corpus_forge::canonical::FuzzyDedupHook::new(
            std::sync::Arc::new(DummyLookup),
            0.85,
        )),
        None,
        0.85,
        vec!["product".to_string(), "team".to_string()],
    );

    let cancel = cancellation_flag();
    let outcome = run_pipeline(
        config,
        &store,
        &ontology,
        &prompt_template,
        &extractor,
        &hooks,
        cancel.as_ref(),
        None,
    )
    .await
    .unwrap();

    (outcome, store)
}

/// `EntityLookup` that delegates nowhere — per-document fuzzy dedup in these
/// tests runs against a deliberately empty candidate set so each document's
/// entities are created fresh; graph-wide fuzzy dedup is covered separately
/// in `orchestrator::hooks` unit tests against a real `SqliteStore`.
struct DummyLookup;

impl corpus_forge::canonical::EntityLookup for DummyLookup {
    fn entities_of_type(
        &self,
        _namespace: &Namespace,
        _entity_type: &str,
    ) -> Vec<(corpus_forge::graph::EntityId, String)> {
        Vec::new()
    }

    fn find_by_normalized_name(
        &self,
        _namespace: &Namespace,
        _entity_type: &str,
        _normalized_name: &str,
    ) -> Option<corpus_forge::graph::EntityId> {
        None
    }
}
