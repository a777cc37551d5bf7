//! The main per-document loop: per-document extraction flow and after-batch hooks

use super::hooks::HookRegistry;
use super::interactive::{review_entities, InteractiveIo};
use super::stats::{RunOutcome, StopReason, Statistics};
use crate::config::RunConfig;
use crate::document::{discover_html_files, HtmlDocumentParser};
use crate::extraction::{truncate_for_context, DuplicateMarker, ExtractedEntity, LlmExtractor};
use crate::ontology::{OntologyPack, PromptAssembler};
use crate::storage::GraphStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("ontology prompt assembly failed: {0}")]
    Prompt(#[from] crate::ontology::PromptError),
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// Cooperative-cancellation flag. Wired to `tokio::signal::ctrl_c()` by the
/// caller; checked between documents, never inside one.
pub fn cancellation_flag() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

/// Spawn a task that flips `flag` on the first Ctrl-C and returns immediately;
/// a second Ctrl-C is left to the process default so a genuinely stuck run
/// can still be killed.
pub fn watch_ctrl_c(flag: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, Ordering::SeqCst);
        }
    });
}

/// Run the ingestion pipeline end to end over `config.source`.
#[allow(clippy::too_many_arguments)]
pub async fn run_pipeline(
    config: &RunConfig,
    store: &dyn GraphStore,
    ontology: &OntologyPack,
    prompt_template: &str,
    extractor: &LlmExtractor,
    hooks: &HookRegistry,
    cancel: &AtomicBool,
    mut interactive_io: Option<&mut dyn InteractiveIo>,
) -> Result<RunOutcome, OrchestratorError> {
    let started = Instant::now();
    store.init_schema()?;

    let assembled = PromptAssembler::assemble(prompt_template, ontology)?;

    let files = discover_html_files(&config.source).unwrap_or_default();
    let mut stats = Statistics {
        total: files.len(),
        ..Default::default()
    };

    let mut consecutive_failures: u32 = 0;
    let mut stop_reason = StopReason::Exhausted;
    let mut any_success = false;

    for path in &files {
        if cancel.load(Ordering::SeqCst) {
            stop_reason = StopReason::Interrupted;
            break;
        }

        let document = HtmlDocumentParser::parse_file(&config.namespace, path);
        let document = match document {
            Ok(doc) => doc,
            Err(err) => {
                stats.failed += 1;
                stats.errors.push(format!("{}: {err}", path.display()));
                consecutive_failures += 1;
                if consecutive_failures > config.max_failures {
                    stop_reason = StopReason::FailureThresholdExceeded;
                    break;
                }
                continue;
            }
        };

        if config.skip_processed && !config.refresh {
            if let Some(existing) = store.find_document(&config.namespace, document.doc_id.as_str())? {
                if existing.content_hash == document.content_hash {
                    stats.skipped += 1;
                    info!(doc_id = %document.doc_id, "skipped: hash_match");
                    continue;
                }
            }
        }

        let (body, was_truncated) = truncate_for_context(&document.text, config.max_document_chars);
        if was_truncated {
            warn!(
                doc_id = %document.doc_id,
                original_len = document.text.chars().count(),
                max_chars = config.max_document_chars,
                "document exceeded context budget; truncated from the tail"
            );
        }
        let prompt = PromptAssembler::for_document(&assembled, &body);
        let outcome = extractor.extract(&prompt).await;

        let mut extraction = match outcome.result {
            Ok(result) => {
                consecutive_failures = 0;
                result
            }
            Err(err) => {
                stats.failed += 1;
                stats.errors.push(format!("{}: {err}", document.doc_id));
                warn!(doc_id = %document.doc_id, error = %err, "extraction failed after retry");
                consecutive_failures += 1;
                if consecutive_failures > config.max_failures {
                    stop_reason = StopReason::FailureThresholdExceeded;
                    break;
                }
                continue;
            }
        };

        apply_confidence_floor(&mut extraction.entities, config.min_confidence);

        hooks.run_before_store(&config.namespace, &mut extraction.entities);

        if config.interactive {
            if let Some(io) = interactive_io.as_deref_mut() {
                review_entities(io, &mut extraction.entities);
            }
        }

        if config.dry_run {
            info!(doc_id = %document.doc_id, entities = extraction.entities.len(), relations = extraction.relations.len(), "dry_run: not written");
            stats.processed += 1;
            any_success = true;
            if reached_batch_limit(config, &stats) {
                stop_reason = StopReason::BatchLimitReached;
                break;
            }
            continue;
        }

        let upsert = store.upsert_document_batch(
            &config.namespace,
            &document,
            &extraction.entities,
            &extraction.relations,
            ontology,
        )?;

        stats.entities_created += upsert.entities_created;
        stats.entities_updated += upsert.entities_updated;
        stats.mentions_created += upsert.mentions_created;
        stats.relationships_created += upsert.relationships_created;
        stats.errors.extend(upsert.warnings);
        stats.processed += 1;
        any_success = true;

        if reached_batch_limit(config, &stats) {
            stop_reason = StopReason::BatchLimitReached;
            break;
        }
    }

    if !config.dry_run && any_success {
        let merged = hooks.run_after_batch(store, &config.namespace, interactive_io.as_deref_mut())?;
        info!(merged, "after_batch complete");
    }

    stats.duration_s = started.elapsed().as_secs_f64();

    Ok(RunOutcome { stats, stop_reason })
}

fn reached_batch_limit(config: &RunConfig, stats: &Statistics) -> bool {
    matches!(config.max_batch_docs, Some(limit) if stats.processed >= limit)
}

/// Entities below `min_confidence` are tombstoned rather than removed, to
/// keep relation indices stable; relations with either side below the
/// floor simply never resolve against a canonical entity, so nothing extra
/// is needed on the relation side.
fn apply_confidence_floor(entities: &mut [ExtractedEntity], min_confidence: f32) {
    if min_confidence <= 0.0 {
        return;
    }
    for e in entities.iter_mut() {
        if let Some(confidence) = e.confidence {
            if confidence < min_confidence && !e.is_duplicate() {
                e.duplicate = DuplicateMarker::Tombstone;
            }
        }
    }
}
