//! Types for the LLM extraction protocol and its in-flight entity list
//!
//! `DuplicateMarker` is the tagged-variant decision record described in
//! DESIGN.md: hooks mutate `ExtractedEntity` in place and set a marker
//! instead of removing or reordering the entity list, which is what keeps
//! relation indices valid across the whole hook chain.

use crate::graph::EntityId;
use serde::{Deserialize, Serialize};

/// One entity surfaced by the LLM, and then mutated in place by the
/// canonicalization hook chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub type_id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,

    /// Filled in by the basic-normalization hook; empty until then.
    #[serde(skip)]
    pub normalized_name: String,
    /// Duplicate-of decision accumulated across the hook chain.
    #[serde(skip)]
    pub duplicate: DuplicateMarker,
}

impl ExtractedEntity {
    pub fn new(type_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            name: name.into(),
            aliases: Vec::new(),
            evidence: None,
            confidence: None,
            normalized_name: String::new(),
            duplicate: DuplicateMarker::None,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        !matches!(self.duplicate, DuplicateMarker::None)
    }

    pub fn is_tombstoned(&self) -> bool {
        matches!(self.duplicate, DuplicateMarker::Tombstone)
    }
}

/// A duplicate-of decision attached to an entry in the entity list.
///
/// `None`, `DuplicateOfBatch(i)`, `DuplicateOfGraph(id)`, `Tombstone` — a
/// closed, trivially serializable set, replacing any object-graph "merge
/// plan" representation.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DuplicateMarker {
    #[default]
    None,
    /// Duplicate of another entry in the same batch, by list index.
    DuplicateOfBatch(usize),
    /// Duplicate of an entity that already exists in the graph.
    DuplicateOfGraph(EntityId),
    /// Removed during interactive review; the slot is kept, never removed.
    Tombstone,
}

/// One relation surfaced by the LLM. `from_entity`/`to_entity` are indices
/// into the sibling `entities` array, not names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRelation {
    pub from_entity: i64,
    pub to_entity: i64,
    #[serde(rename = "type")]
    pub relation_type: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub evidence: Option<String>,
}

/// The decoded `{entities, relations}` payload for one document.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub entities: Vec<ExtractedEntity>,
    pub relations: Vec<ExtractedRelation>,
}

/// Per-call observability record.
#[derive(Debug, Clone)]
pub struct ExtractionCallRecord {
    pub provider: String,
    pub model_id: String,
    pub prompt_chars: usize,
    pub elapsed_ms: u64,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub outcome: CallOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure(String),
}
