//! Strict JSON response parsing
//!
//! The model is asked for exactly one JSON object but in practice wraps it
//! in fenced code blocks or surrounds it with commentary. We recover the
//! single outermost `{...}` by brace-balancing (respecting quoted strings)
//! rather than requiring the raw text to itself be valid JSON.

use super::types::{ExtractedEntity, ExtractedRelation, ExtractionResult};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object found in response")]
    NoJsonObjectFound,
    #[error("invalid JSON: {0}")]
    Invalid(#[from] serde_json::Error),
}

pub struct ResponseParser;

impl ResponseParser {
    /// Parse a raw LLM response into an `ExtractionResult`, plus any
    /// warnings (currently: dropped out-of-range relation indices).
    pub fn parse(raw: &str) -> Result<(ExtractionResult, Vec<String>), ParseError> {
        let json_str = Self::extract_json_object(raw)?;
        let value: serde_json::Value = serde_json::from_str(&json_str)?;

        let entities: Vec<ExtractedEntity> = match value.get("entities") {
            Some(v) => serde_json::from_value(v.clone())?,
            None => Vec::new(),
        };
        let raw_relations: Vec<ExtractedRelation> = match value.get("relations") {
            Some(v) => serde_json::from_value(v.clone())?,
            None => Vec::new(),
        };

        let mut warnings = Vec::new();
        let mut relations = Vec::with_capacity(raw_relations.len());
        for rel in raw_relations {
            let in_range = |idx: i64| idx >= 0 && (idx as usize) < entities.len();
            if !in_range(rel.from_entity) || !in_range(rel.to_entity) {
                warnings.push(format!(
                    "dropping relation '{}': index out of range (from={}, to={}, entities={})",
                    rel.relation_type,
                    rel.from_entity,
                    rel.to_entity,
                    entities.len()
                ));
                continue;
            }
            relations.push(rel);
        }

        Ok((ExtractionResult { entities, relations }, warnings))
    }

    /// Find the first `{` and the matching closing `}` (honoring quoted
    /// strings and escapes), and return the slice between them inclusive.
    fn extract_json_object(raw: &str) -> Result<String, ParseError> {
        let start = raw.find('{').ok_or(ParseError::NoJsonObjectFound)?;
        let bytes = raw.as_bytes();
        let mut depth: i32 = 0;
        let mut in_string = false;
        let mut escape = false;
        let mut end = None;

        for (i, &b) in bytes.iter().enumerate().skip(start) {
            let c = b as char;
            if in_string {
                if escape {
                    escape = false;
                } else if c == '\\' {
                    escape = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }

        let end = end.ok_or(ParseError::NoJsonObjectFound)?;
        Ok(raw[start..=end].to_string())
    }
}
