//! `corpus-forge` CLI
//!
//! A thin wrapper over the orchestrator: this binary parses flags, wires up
//! the store/provider/hook chain, and maps `RunOutcome::exit_code()` to the
//! process exit code. `query …` and the ontology-management surface beyond
//! inspection are external collaborators and are not implemented here.

use clap::{Args, Parser, Subcommand};
use corpus_forge::canonical::{Dictionary, FuzzyDedupHook, MockEmbedder};
use corpus_forge::config::RunConfig;
use corpus_forge::document::HtmlDocumentParser;
use corpus_forge::extraction::{provider_from_env, LlmExtractor};
use corpus_forge::ontology::{OntologyLoader, PromptAssembler};
use corpus_forge::orchestrator::{
    cancellation_flag, default_hook_registry, run_pipeline, watch_ctrl_c, TerminalIo,
};
use corpus_forge::storage::{GraphStore, SqliteStore};
use corpus_forge::vector::{SqliteVectorSidecar, VectorSidecar};
use corpus_forge::Namespace;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "corpus-forge", about = "Ontology-driven HTML corpus to knowledge graph ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive the pipeline on a directory of HTML documents.
    Ingest(IngestArgs),
    /// One-shot: parse a file and run extraction only.
    Extract { file: PathBuf },
    /// Schema/state management for the graph store.
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    /// Inspect the ontology pack.
    Entities {
        #[command(subcommand)]
        action: EntitiesAction,
    },
}

#[derive(Args)]
struct IngestArgs {
    #[arg(long)]
    source: PathBuf,
    #[arg(long, default_value = "default")]
    namespace: String,
    #[arg(long)]
    entities_dir: PathBuf,
    #[arg(long, default_value = "prompt_template.md")]
    prompt_template: PathBuf,
    #[arg(long)]
    dictionary: Option<PathBuf>,
    #[arg(long)]
    graph_db: Option<PathBuf>,
    #[arg(long)]
    vector_db: Option<PathBuf>,
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    refresh: bool,
    #[arg(long)]
    interactive: bool,
    #[arg(long)]
    max_batch_docs: Option<usize>,
    #[arg(long = "types", value_delimiter = ',')]
    types: Vec<String>,
    #[arg(long, default_value_t = 0.0)]
    min_confidence: f32,
    #[arg(long)]
    max_failures: Option<u32>,
    #[arg(long)]
    model: Option<String>,
}

#[derive(Subcommand)]
enum DbAction {
    Init {
        #[arg(long)]
        graph_db: PathBuf,
    },
    Status {
        #[arg(long)]
        graph_db: PathBuf,
    },
    Clear {
        #[arg(long)]
        graph_db: PathBuf,
        #[arg(long)]
        vector_db: Option<PathBuf>,
        #[arg(long, default_value = "default")]
        namespace: String,
    },
    Start,
    Stop,
}

#[derive(Subcommand)]
enum EntitiesAction {
    List {
        #[arg(long)]
        entities_dir: PathBuf,
    },
    Show {
        #[arg(long)]
        entities_dir: PathBuf,
        id: String,
    },
    Validate {
        #[arg(long)]
        entities_dir: PathBuf,
    },
    Template {
        #[arg(long)]
        entities_dir: PathBuf,
        #[arg(long, default_value = "prompt_template.md")]
        prompt_template: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("corpus_forge=info".parse().unwrap()))
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Command::Ingest(args) => run_ingest(args).await,
        Command::Extract { file } => run_extract(&file).await,
        Command::Db { action } => run_db(action),
        Command::Entities { action } => run_entities(action),
    };
    std::process::exit(exit_code);
}

/// Pick the embedding backend at startup. `fastembed` requires
/// downloading model weights on first use, so default builds fall back to
/// the deterministic hash embedder rather than forcing that dependency.
#[cfg(feature = "embeddings")]
fn embedder() -> Arc<dyn corpus_forge::canonical::Embedder> {
    match corpus_forge::canonical::FastEmbedEmbedder::default_model() {
        Ok(e) => Arc::new(e),
        Err(err) => {
            tracing::warn!(%err, "fastembed model unavailable, falling back to mock embedder");
            Arc::new(MockEmbedder::default())
        }
    }
}

#[cfg(not(feature = "embeddings"))]
fn embedder() -> Arc<dyn corpus_forge::canonical::Embedder> {
    Arc::new(MockEmbedder::default())
}

async fn run_ingest(args: IngestArgs) -> i32 {
    let namespace = Namespace::from_string(args.namespace);
    let mut config = RunConfig::new(
        namespace.clone(),
        args.source,
        args.entities_dir.clone(),
        args.prompt_template.clone(),
    );
    config.dictionary_file = args.dictionary;
    config.graph_db_path = args.graph_db.clone();
    config.vector_db_path = args.vector_db.clone();
    config.dry_run = args.dry_run;
    config.refresh = args.refresh;
    config.interactive = args.interactive;
    config.max_batch_docs = args.max_batch_docs;
    config.min_confidence = args.min_confidence;
    if let Some(max_failures) = args.max_failures {
        config.max_failures = max_failures;
    }

    let ontology = match OntologyLoader::load(&config.entities_dir) {
        Ok(pack) => pack,
        Err(err) => {
            eprintln!("failed to load ontology pack: {err}");
            return 2;
        }
    };
    for warning in &ontology.warnings {
        tracing::warn!(%warning, "ontology pack warning");
    }
    // `--types` is the extractor contract's `entity_type_filter`: restrict
    // both the assembled prompt and the after-batch dedup scan to just
    // these type ids. Empty means no restriction.
    let ontology = ontology.filtered(&args.types);

    let prompt_template = match std::fs::read_to_string(&config.prompt_template_file) {
        Ok(t) => t,
        Err(err) => {
            eprintln!("failed to read prompt template {}: {err}", config.prompt_template_file.display());
            return 2;
        }
    };

    if let Some(model) = &args.model {
        if std::env::var("OPENROUTER_API_KEY").is_ok() {
            std::env::set_var("OPENROUTER_MODEL_NAME", model);
        } else {
            std::env::set_var("BEDROCK_MODEL_NAME", model);
        }
    }

    let provider = match provider_from_env() {
        Ok(p) => p,
        Err(err) => {
            eprintln!("no LLM provider configured: {err}");
            return 2;
        }
    };
    let extractor = LlmExtractor::new(provider, config.llm_timeout);

    let store = match &config.graph_db_path {
        Some(path) => SqliteStore::open(path),
        None => SqliteStore::open_in_memory(),
    };
    let store = match store {
        Ok(s) => Arc::new(s),
        Err(err) => {
            eprintln!("failed to open graph store: {err}");
            return 2;
        }
    };

    let dictionary = config
        .dictionary_file
        .as_ref()
        .map(Dictionary::load)
        .unwrap_or_else(Dictionary::empty);

    let fuzzy_lookup: Arc<dyn corpus_forge::canonical::EntityLookup> = store.clone();
    let fuzzy = Arc::new(FuzzyDedupHook::new(fuzzy_lookup, config.fuzzy_threshold));

    let vector_hook = match &config.vector_db_path {
        Some(path) => match SqliteVectorSidecar::open(path) {
            Ok(sidecar) => {
                let vector_lookup: Arc<dyn corpus_forge::canonical::EntityLookup> = store.clone();
                Some(Arc::new(corpus_forge::canonical::VectorDedupHook::new(
                    embedder(),
                    Arc::new(sidecar),
                    vector_lookup,
                    config.vector_threshold,
                )))
            }
            Err(err) => {
                tracing::warn!(%err, "vector sidecar unavailable, continuing without vector dedup");
                None
            }
        },
        None => None,
    };

    // `ontology` is already filtered to `args.types` above, so its keys
    // are the exact scan scope either way.
    let entity_type_ids: Vec<String> = ontology.types.keys().cloned().collect();

    let hooks = default_hook_registry(dictionary, fuzzy, vector_hook, config.fuzzy_threshold, entity_type_ids);

    let cancel = cancellation_flag();
    watch_ctrl_c(cancel.clone());

    let mut io = TerminalIo::default();
    let interactive_io: Option<&mut dyn corpus_forge::orchestrator::InteractiveIo> =
        if config.interactive { Some(&mut io) } else { None };

    let outcome = run_pipeline(
        &config,
        store.as_ref(),
        &ontology,
        &prompt_template,
        &extractor,
        &hooks,
        cancel.as_ref(),
        interactive_io,
    )
    .await;

    match outcome {
        Ok(outcome) => {
            println!(
                "processed {}/{} (skipped {}, failed {}), {} entities created, {} mentions, {} relationships, {:.2}s",
                outcome.stats.processed,
                outcome.stats.total,
                outcome.stats.skipped,
                outcome.stats.failed,
                outcome.stats.entities_created,
                outcome.stats.mentions_created,
                outcome.stats.relationships_created,
                outcome.stats.duration_s,
            );
            if cancel.load(Ordering::SeqCst) {
                eprintln!("interrupted");
            }
            outcome.exit_code()
        }
        Err(err) => {
            eprintln!("pipeline error: {err}");
            2
        }
    }
}

async fn run_extract(file: &std::path::Path) -> i32 {
    let namespace = Namespace::default();
    let document = match HtmlDocumentParser::parse_file(&namespace, file) {
        Ok(doc) => doc,
        Err(err) => {
            eprintln!("failed to parse {}: {err}", file.display());
            return 2;
        }
    };

    let provider = match provider_from_env() {
        Ok(p) => p,
        Err(err) => {
            eprintln!("no LLM provider configured: {err}");
            return 2;
        }
    };
    let extractor = LlmExtractor::new(provider, Duration::from_secs(30));
    let prompt = format!("Extract entities and relations from:\n\n{}", document.text);
    let outcome = extractor.extract(&prompt).await;

    match outcome.result {
        Ok(result) => {
            match serde_json::to_string_pretty(&serde_json::json!({
                "entities": result.entities,
                "relations": result.relations,
            })) {
                Ok(json) => println!("{json}"),
                Err(err) => eprintln!("failed to serialize result: {err}"),
            }
            0
        }
        Err(err) => {
            eprintln!("extraction failed: {err}");
            1
        }
    }
}

fn run_db(action: DbAction) -> i32 {
    match action {
        DbAction::Init { graph_db } => match SqliteStore::open(&graph_db) {
            Ok(store) => match store.init_schema() {
                Ok(()) => {
                    println!("schema initialized at {}", graph_db.display());
                    0
                }
                Err(err) => {
                    eprintln!("init failed: {err}");
                    2
                }
            },
            Err(err) => {
                eprintln!("failed to open {}: {err}", graph_db.display());
                2
            }
        },
        DbAction::Status { graph_db } => {
            println!("graph store: {}", graph_db.display());
            0
        }
        DbAction::Clear { graph_db, vector_db, namespace } => match SqliteStore::open(&graph_db) {
            Ok(store) => {
                let ns = Namespace::from_string(namespace);
                match store.clear_namespace(&ns) {
                    Ok(mut counts) => {
                        if let Some(vector_db) = &vector_db {
                            match SqliteVectorSidecar::open(vector_db) {
                                Ok(sidecar) => match sidecar.delete_namespace(&ns) {
                                    Ok(n) => counts.vector_entries_deleted = n,
                                    Err(err) => {
                                        eprintln!("vector sidecar clear failed: {err}");
                                        return 2;
                                    }
                                },
                                Err(err) => {
                                    eprintln!("failed to open {}: {err}", vector_db.display());
                                    return 2;
                                }
                            }
                        }
                        println!(
                            "deleted {} nodes, {} edges, {} vector entries",
                            counts.nodes_deleted, counts.edges_deleted, counts.vector_entries_deleted
                        );
                        0
                    }
                    Err(err) => {
                        eprintln!("clear failed: {err}");
                        2
                    }
                }
            }
            Err(err) => {
                eprintln!("failed to open {}: {err}", graph_db.display());
                2
            }
        },
        // Embedded SQLite has no separate process to start/stop (DESIGN.md).
        DbAction::Start | DbAction::Stop => {
            println!("no-op: the graph store is embedded SQLite, not a managed server");
            0
        }
    }
}

fn run_entities(action: EntitiesAction) -> i32 {
    match action {
        EntitiesAction::List { entities_dir } => match OntologyLoader::load(&entities_dir) {
            Ok(pack) => {
                for (id, def) in &pack.types {
                    println!("{id}: {}", def.name);
                }
                0
            }
            Err(err) => {
                eprintln!("{err}");
                2
            }
        },
        EntitiesAction::Show { entities_dir, id } => match OntologyLoader::load(&entities_dir) {
            Ok(pack) => match pack.get(&id) {
                Some(def) => {
                    println!("{}", def.raw_markdown);
                    0
                }
                None => {
                    eprintln!("no such entity type: {id}");
                    1
                }
            },
            Err(err) => {
                eprintln!("{err}");
                2
            }
        },
        EntitiesAction::Validate { entities_dir } => match OntologyLoader::load(&entities_dir) {
            Ok(pack) => {
                for warning in &pack.warnings {
                    eprintln!("warning: {warning}");
                }
                println!("{} entity types parsed", pack.types.len());
                0
            }
            Err(err) => {
                eprintln!("{err}");
                2
            }
        },
        EntitiesAction::Template { entities_dir, prompt_template } => {
            let pack = match OntologyLoader::load(&entities_dir) {
                Ok(pack) => pack,
                Err(err) => {
                    eprintln!("{err}");
                    return 2;
                }
            };
            let template = match std::fs::read_to_string(&prompt_template) {
                Ok(t) => t,
                Err(err) => {
                    eprintln!("failed to read {}: {err}", prompt_template.display());
                    return 2;
                }
            };
            match PromptAssembler::assemble(&template, &pack) {
                Ok(assembled) => {
                    println!("{assembled}");
                    0
                }
                Err(err) => {
                    eprintln!("{err}");
                    2
                }
            }
        }
    }
}
