//! End-to-end pipeline scenarios

mod common;

use common::{config_for, run_with_responses, write_doc};
use corpus_forge::canonical::{Dictionary, EntityLookup, FuzzyDedupHook};
use corpus_forge::extraction::{LlmExtractor, MockProvider, ProviderResponse};
use corpus_forge::graph::{EntityId, Namespace};
use corpus_forge::ontology::OntologyLoader;
use corpus_forge::orchestrator::{cancellation_flag, default_hook_registry, run_pipeline, StopReason};
use corpus_forge::storage::{GraphStore, SqliteStore};
use std::sync::Arc;
use std::time::Duration;

/// `EntityLookup` that never matches anything, for scenarios that only care
/// about document-level flow rather than per-document fuzzy dedup.
struct NoopLookup;

impl EntityLookup for NoopLookup {
    fn entities_of_type(&self, _namespace: &Namespace, _entity_type: &str) -> Vec<(EntityId, String)> {
        Vec::new()
    }

    fn find_by_normalized_name(&self, _namespace: &Namespace, _entity_type: &str, _normalized_name: &str) -> Option<EntityId> {
        None
    }
}

fn hooks_for(entity_types: Vec<&str>) -> corpus_forge::orchestrator::HookRegistry {
    default_hook_registry(
        Dictionary::empty(),
        Arc::new(FuzzyDedupHook::new(Arc::new(NoopLookup), 0.85)),
        None,
        0.85,
        entity_types.into_iter().map(String::from).collect(),
    )
}

#[tokio::test]
async fn happy_path_creates_entities_mentions_and_one_typed_edge() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "a", "A", "Knowledge Discovery is owned by Platform Engineering.");
    write_doc(dir.path(), "b", "B", "KD is mentioned again here.");
    let config = config_for("acme", dir.path().to_path_buf());

    let a_response = r#"{
        "entities": [
            {"type_id": "product", "name": "Knowledge Discovery", "aliases": ["KD"]},
            {"type_id": "team", "name": "Platform Engineering"}
        ],
        "relations": [
            {"from_entity": 1, "to_entity": 0, "type": "OWNED_BY"}
        ]
    }"#;
    let b_response = r#"{
        "entities": [
            {"type_id": "product", "name": "Knowledge Discovery"}
        ],
        "relations": []
    }"#;

    let (outcome, store) = run_with_responses(&config, vec![a_response, b_response]).await;

    assert_eq!(outcome.stats.processed, 2);
    assert_eq!(outcome.stats.failed, 0);
    assert_eq!(outcome.stats.entities_created, 2);
    assert_eq!(outcome.stats.mentions_created, 3, "doc a mentions product+team, doc b mentions the same product again");
    assert_eq!(outcome.stats.relationships_created, 1);

    let ns = Namespace::from_string("acme");
    let products = store.entities_of_type_detailed(&ns, "product").unwrap();
    assert_eq!(products.len(), 1, "the same merge key in doc b resolves to the entity created in doc a rather than duplicating it");
    assert_eq!(products[0].name, "Knowledge Discovery");

    // The extraction emitted this relation as team(1) -> product(0), but the
    // test ontology's `product.md` defines `team : OWNED_BY : OWNS`, so
    // product is the canonical source regardless of the index order the
    // extractor used.
    let teams = store.entities_of_type_detailed(&ns, "team").unwrap();
    assert_eq!(teams.len(), 1);
    let edges = store.typed_edges(&ns).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].relationship, "OWNED_BY");
    assert_eq!(edges[0].source, products[0].id, "source must be the ontology's defining type (product), not the extractor's from_entity");
    assert_eq!(edges[0].target, teams[0].id);
}

#[tokio::test]
async fn relation_direction_is_canonicalized_even_when_the_extractor_reverses_it() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "a", "A", "Platform Engineering owns Knowledge Discovery.");
    let config = config_for("acme", dir.path().to_path_buf());

    // team is entity 0, product is entity 1, and the relation is reported
    // from_entity=0 (team) to_entity=1 (product) using "OWNS" — the reverse
    // display label product.md lists for this relation.
    let response = r#"{
        "entities": [
            {"type_id": "team", "name": "Platform Engineering"},
            {"type_id": "product", "name": "Knowledge Discovery"}
        ],
        "relations": [
            {"from_entity": 0, "to_entity": 1, "type": "OWNS"}
        ]
    }"#;

    let (outcome, store) = run_with_responses(&config, vec![response]).await;
    assert_eq!(outcome.stats.relationships_created, 1);

    let ns = Namespace::from_string("acme");
    let products = store.entities_of_type_detailed(&ns, "product").unwrap();
    let teams = store.entities_of_type_detailed(&ns, "team").unwrap();
    let edges = store.typed_edges(&ns).unwrap();

    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source, products[0].id, "product is always the source no matter which side the extractor emitted it from");
    assert_eq!(edges[0].target, teams[0].id);
    assert_eq!(edges[0].relationship, "OWNED_BY", "the reverse display label OWNS is normalized to the canonical to_label");
}

#[tokio::test]
async fn alias_mention_is_absorbed_into_the_existing_entity() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "a", "A", "Knowledge Discovery launched this quarter.");
    write_doc(dir.path(), "b", "B", "K.D. shipped a new feature.");
    let mut config = config_for("acme", dir.path().to_path_buf());

    // The merge key is (type, normalized_name); "K.D." and "Knowledge
    // Discovery" don't share one on their own, so a dictionary entry is
    // what lets the second mention resolve to the first doc's entity.
    let dict_path = dir.path().join("dictionary.txt");
    std::fs::write(&dict_path, "K.D. : Knowledge Discovery\n").unwrap();
    config.dictionary_file = Some(dict_path);

    let ontology = OntologyLoader::load(&config.entities_dir).unwrap();
    let prompt_template = std::fs::read_to_string(&config.prompt_template_file).unwrap();
    let store = SqliteStore::open_in_memory().unwrap();

    let a_response = r#"{
        "entities": [
            {"type_id": "product", "name": "Knowledge Discovery", "aliases": ["KD"]}
        ],
        "relations": []
    }"#;
    let b_response = r#"{
        "entities": [
            {"type_id": "product", "name": "K.D."}
        ],
        "relations": []
    }"#;
    let provider = MockProvider::new(vec![
        Ok(ProviderResponse { text: a_response.to_string(), prompt_tokens: None, completion_tokens: None }),
        Ok(ProviderResponse { text: b_response.to_string(), prompt_tokens: None, completion_tokens: None }),
    ]);
    let extractor = LlmExtractor::new(Box::new(provider), Duration::from_secs(5));

    let hooks = default_hook_registry(
        Dictionary::load(config.dictionary_file.as_ref().unwrap()),
        Arc::new(FuzzyDedupHook::new(Arc::new(NoopLookup), 0.85)),
        None,
        0.85,
        vec!["product".to_string()],
    );
    let cancel = cancellation_flag();
    let outcome = run_pipeline(&config, &store, &ontology, &prompt_template, &extractor, &hooks, cancel.as_ref(), None)
        .await
        .unwrap();

    assert_eq!(outcome.stats.processed, 2);
    assert_eq!(outcome.stats.entities_created, 1, "K.D. expands to the dictionary's canonical name and resolves to the product created in doc a, not a new entity");
    assert_eq!(outcome.stats.mentions_created, 2);

    let ns = Namespace::from_string("acme");
    let products = store.entities_of_type_detailed(&ns, "product").unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].name, "Knowledge Discovery");
}

#[tokio::test]
async fn idempotent_rerun_on_unchanged_corpus_writes_nothing_new() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "a", "A", "Knowledge Discovery.");
    write_doc(dir.path(), "b", "B", "Platform Engineering.");
    let config = config_for("acme", dir.path().to_path_buf());

    let response_a = r#"{"entities":[{"type_id":"product","name":"Knowledge Discovery"}],"relations":[]}"#;
    let response_b = r#"{"entities":[{"type_id":"team","name":"Platform Engineering"}],"relations":[]}"#;

    let (first, store) = run_with_responses(&config, vec![response_a, response_b]).await;
    assert_eq!(first.stats.processed, 2);
    assert_eq!(first.stats.skipped, 0);

    // Re-run against the same store with unchanged files: every doc must
    // hash-skip and nothing new gets written.
    let ontology = OntologyLoader::load(&config.entities_dir).unwrap();
    let prompt_template = std::fs::read_to_string(&config.prompt_template_file).unwrap();
    let extractor = LlmExtractor::new(Box::new(MockProvider::new(vec![])), Duration::from_secs(5));
    let hooks = hooks_for(vec!["product", "team"]);
    let cancel = cancellation_flag();
    let second = run_pipeline(&config, &store, &ontology, &prompt_template, &extractor, &hooks, cancel.as_ref(), None)
        .await
        .unwrap();

    assert_eq!(second.stats.processed, 0);
    assert_eq!(second.stats.skipped, 2);
    assert_eq!(second.stats.entities_created, 0);
    assert_eq!(second.stats.relationships_created, 0);
}

#[tokio::test]
async fn malformed_relation_index_is_dropped_without_failing_the_document() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "a", "A", "Three things mentioned here.");
    let config = config_for("acme", dir.path().to_path_buf());

    let response = r#"{
        "entities": [
            {"type_id": "product", "name": "Alpha"},
            {"type_id": "product", "name": "Beta"},
            {"type_id": "product", "name": "Gamma"}
        ],
        "relations": [
            {"from_entity": 7, "to_entity": 0, "type": "uses"}
        ]
    }"#;

    let (outcome, store) = run_with_responses(&config, vec![response]).await;

    assert_eq!(outcome.stats.processed, 1);
    assert_eq!(outcome.stats.failed, 0);
    assert_eq!(outcome.stats.entities_created, 3);
    assert_eq!(outcome.stats.relationships_created, 0);
    assert!(!outcome.stats.errors.is_empty(), "an out-of-range relation index should surface a warning");

    let ns = Namespace::from_string("acme");
    assert_eq!(store.entities_of_type_detailed(&ns, "product").unwrap().len(), 3);
}

#[tokio::test]
async fn retry_then_failure_marks_doc_failed_and_next_doc_still_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "a", "A", "Bad doc.");
    write_doc(dir.path(), "b", "B", "Good doc.");
    let config = config_for("acme", dir.path().to_path_buf());

    let ontology = OntologyLoader::load(&config.entities_dir).unwrap();
    let prompt_template = std::fs::read_to_string(&config.prompt_template_file).unwrap();
    let store = SqliteStore::open_in_memory().unwrap();

    // doc a: two malformed responses back to back (initial attempt + the
    // one automatic retry) exhaust the extractor's budget for that
    // document; doc b succeeds on its first attempt.
    let provider = MockProvider::new(vec![
        Ok(ProviderResponse { text: "not json".to_string(), prompt_tokens: None, completion_tokens: None }),
        Ok(ProviderResponse { text: "still not json".to_string(), prompt_tokens: None, completion_tokens: None }),
        Ok(ProviderResponse {
            text: r#"{"entities":[{"type_id":"product","name":"Gamma"}],"relations":[]}"#.to_string(),
            prompt_tokens: None,
            completion_tokens: None,
        }),
    ]);
    let extractor = LlmExtractor::new(Box::new(provider), Duration::from_secs(5));
    let hooks = hooks_for(vec!["product"]);
    let cancel = cancellation_flag();

    let outcome = run_pipeline(&config, &store, &ontology, &prompt_template, &extractor, &hooks, cancel.as_ref(), None)
        .await
        .unwrap();

    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.stats.processed, 1);
    assert_eq!(outcome.stop_reason, StopReason::Exhausted);

    let ns = Namespace::from_string("acme");
    assert_eq!(store.entities_of_type_detailed(&ns, "product").unwrap().len(), 1);
}

#[tokio::test]
async fn empty_corpus_completes_cleanly_with_zero_documents() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for("acme", dir.path().to_path_buf());

    let (outcome, _store) = run_with_responses(&config, vec![]).await;

    assert_eq!(outcome.stats.total, 0);
    assert_eq!(outcome.stats.processed, 0);
    assert_eq!(outcome.stop_reason, StopReason::Exhausted);
    assert_eq!(outcome.exit_code(), 0);
}

#[tokio::test]
async fn oversized_document_is_truncated_and_still_processed() {
    let dir = tempfile::tempdir().unwrap();
    let long_body = "Knowledge Discovery. ".repeat(20_000);
    write_doc(dir.path(), "a", "A", &long_body);
    let mut config = config_for("acme", dir.path().to_path_buf());
    config.max_document_chars = 100;

    let response = r#"{"entities":[{"type_id":"product","name":"Knowledge Discovery"}],"relations":[]}"#;
    let (outcome, _store) = run_with_responses(&config, vec![response]).await;

    assert_eq!(outcome.stats.processed, 1);
    assert_eq!(outcome.stats.failed, 0);
    assert_eq!(outcome.stats.entities_created, 1);
}

#[tokio::test]
async fn consecutive_failures_past_threshold_abort_the_run() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "a", "A", "Bad doc one.");
    write_doc(dir.path(), "b", "B", "Bad doc two.");
    write_doc(dir.path(), "c", "C", "Bad doc three.");
    write_doc(dir.path(), "d", "D", "Never reached.");
    let mut config = config_for("acme", dir.path().to_path_buf());
    config.max_failures = 2;

    let ontology = OntologyLoader::load(&config.entities_dir).unwrap();
    let prompt_template = std::fs::read_to_string(&config.prompt_template_file).unwrap();
    let store = SqliteStore::open_in_memory().unwrap();

    // Three documents in a row fail after their retry (6 malformed
    // responses total): the 3rd failure pushes consecutive_failures to 3,
    // past max_failures=2, aborting before doc d is ever attempted.
    let bad = ProviderResponse { text: "not json".to_string(), prompt_tokens: None, completion_tokens: None };
    let provider = MockProvider::new(vec![
        Ok(bad.clone()), Ok(bad.clone()),
        Ok(bad.clone()), Ok(bad.clone()),
        Ok(bad.clone()), Ok(bad),
    ]);
    let extractor = LlmExtractor::new(Box::new(provider), Duration::from_secs(5));
    let hooks = hooks_for(vec!["product"]);
    let cancel = cancellation_flag();

    let outcome = run_pipeline(&config, &store, &ontology, &prompt_template, &extractor, &hooks, cancel.as_ref(), None)
        .await
        .unwrap();

    assert_eq!(outcome.stop_reason, StopReason::FailureThresholdExceeded);
    assert_eq!(outcome.stats.failed, 3);
    assert_eq!(outcome.stats.processed, 0);
    assert_eq!(outcome.exit_code(), 2);

    let ns = Namespace::from_string("acme");
    assert!(store.find_document(&ns, "d").unwrap().is_none(), "doc d is never reached once the run aborts");
}

#[tokio::test]
async fn max_batch_docs_stops_after_exactly_k_successes() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "a", "A", "Alpha entity here.");
    write_doc(dir.path(), "b", "B", "Beta entity here.");
    write_doc(dir.path(), "c", "C", "Gamma entity here.");
    let mut config = config_for("acme", dir.path().to_path_buf());
    config.max_batch_docs = Some(2);

    let responses = vec![
        r#"{"entities":[{"type_id":"product","name":"Alpha"}],"relations":[]}"#,
        r#"{"entities":[{"type_id":"product","name":"Beta"}],"relations":[]}"#,
        r#"{"entities":[{"type_id":"product","name":"Gamma"}],"relations":[]}"#,
    ];
    let (outcome, _store) = run_with_responses(&config, responses).await;

    assert_eq!(outcome.stats.processed, 2);
    assert_eq!(outcome.stop_reason, StopReason::BatchLimitReached);
}
