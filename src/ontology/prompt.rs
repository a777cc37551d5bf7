//! Deterministic prompt assembly from an ontology pack and a template

use super::loader::OntologyPack;
use thiserror::Error;

const ENTITY_TYPE_PLACEHOLDER: &str = "{{ENTITY_TYPE_DEFINITIONS}}";
const TEXT_PLACEHOLDER: &str = "{{TEXT}}";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template is missing the {{{{ENTITY_TYPE_DEFINITIONS}}}} placeholder")]
    MissingEntityTypePlaceholder,
}

pub struct PromptAssembler;

impl PromptAssembler {
    /// Concatenate the raw markdown of every type in the pack, sorted by id
    /// (the `BTreeMap` underlying `OntologyPack::types` already orders them).
    /// Same inputs always produce a byte-identical string.
    pub fn merged_type_definitions(pack: &OntologyPack) -> String {
        pack.types
            .values()
            .map(|t| t.raw_markdown.trim_end())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Substitute `{{ENTITY_TYPE_DEFINITIONS}}` in `template`, leaving
    /// `{{TEXT}}` in place for per-document substitution.
    pub fn assemble(template: &str, pack: &OntologyPack) -> Result<String, PromptError> {
        if !template.contains(ENTITY_TYPE_PLACEHOLDER) {
            return Err(PromptError::MissingEntityTypePlaceholder);
        }
        let defs = Self::merged_type_definitions(pack);
        Ok(template.replace(ENTITY_TYPE_PLACEHOLDER, &defs))
    }

    /// Substitute `{{TEXT}}` in an already-assembled prompt for a specific
    /// document's body.
    pub fn for_document(assembled_template: &str, document_text: &str) -> String {
        assembled_template.replace(TEXT_PLACEHOLDER, document_text)
    }
}
