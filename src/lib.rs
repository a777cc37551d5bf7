//! corpus-forge: ontology-driven HTML corpus → knowledge graph ingestion
//!
//! Given a directory of semi-structured HTML documents and an ontology pack
//! (markdown entity-type definitions), the pipeline extracts typed entities
//! and relations via an LLM, canonicalizes them through a normalization and
//! deduplication hook chain, and upserts the result into a namespaced graph
//! store alongside an embeddings sidecar used for vector-based dedup.
//!
//! # Pipeline
//!
//! ```text
//! HTML file ─ Parser ─► Document
//!                           │
//! Ontology Pack ─ PromptAssembler ─► prompt ─► LlmExtractor ─► ExtractionResult
//!                                                                   │
//!                                      before_store hooks (normalize, dedup)
//!                                                                   │
//!                                          GraphStore::upsert_document_batch
//!                                                                   │
//!                                      Statistics, after_batch hooks (global dedup)
//! ```
//!
//! See `DESIGN.md` for the grounding ledger and open-question decisions.

pub mod canonical;
pub mod config;
pub mod document;
pub mod extraction;
pub mod graph;
pub mod ontology;
pub mod orchestrator;
pub mod storage;
pub mod vector;

pub use config::RunConfig;
pub use graph::{DocId, Document, Entity, EntityId, Link, LinkKind, Mention, Namespace, TypedEdge};
pub use orchestrator::{run_pipeline, RunOutcome, StopReason};
