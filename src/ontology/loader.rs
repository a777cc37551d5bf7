//! Markdown ontology pack parsing
//!
//! Parsing is deliberately line-oriented and lenient — the grammar is a
//! handful of literal heading prefixes, not general CommonMark, so this
//! walks `str::lines()` directly rather than pulling in a markdown-AST
//! crate.

use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OntologyError {
    #[error("ontology directory not found: {0}")]
    MissingDirectory(String),

    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// An allowed outgoing relation for an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    pub target_type: String,
    pub to_label: String,
    pub from_label: String,
}

/// A parsed entity-type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTypeDef {
    pub id: String,
    pub name: String,
    pub description: String,
    pub relations: Vec<RelationDef>,
    pub examples: Vec<String>,
    /// The file's raw markdown, used verbatim for deterministic prompt assembly.
    pub raw_markdown: String,
}

/// The loaded ontology: types keyed by id (sorted, since `BTreeMap` orders
/// by key), plus any non-fatal warnings accumulated while parsing.
#[derive(Debug, Clone, Default)]
pub struct OntologyPack {
    pub types: BTreeMap<String, EntityTypeDef>,
    pub warnings: Vec<String>,
}

/// The outcome of normalizing one extracted relation against the ontology's
/// canonical direction: whether the endpoints need swapping, and the label
/// to store (always the defining type's `to_label`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelation {
    pub swap: bool,
    pub canonical_label: String,
}

impl OntologyPack {
    pub fn get(&self, type_id: &str) -> Option<&EntityTypeDef> {
        self.types.get(type_id)
    }

    /// All relation labels a given source type is allowed to emit.
    pub fn relations_for(&self, source_type: &str) -> &[RelationDef] {
        self.types
            .get(source_type)
            .map(|t| t.relations.as_slice())
            .unwrap_or(&[])
    }

    /// Resolve the canonical direction and label for a relation the
    /// extractor emitted between `from_type` (the LLM's `from_entity`) and
    /// `to_type` (its `to_entity`), given the label it used.
    ///
    /// A relation is only ever defined under the type whose markdown file
    /// lists it (`target_type : TO_LABEL : FROM_LABEL`) — that type is
    /// always the canonical source, regardless of which index order or
    /// which of the two labels the extractor picked. Returns `None` when
    /// neither type defines a relation matching `label` against the other,
    /// meaning the pack has nothing to say about it and the caller should
    /// pass the edge through unchanged.
    pub fn resolve_direction(
        &self,
        from_type: &str,
        to_type: &str,
        label: &str,
    ) -> Option<ResolvedRelation> {
        if let Some(def) = self
            .relations_for(from_type)
            .iter()
            .find(|r| r.target_type == to_type && (r.to_label == label || r.from_label == label))
        {
            return Some(ResolvedRelation {
                swap: false,
                canonical_label: def.to_label.clone(),
            });
        }
        if let Some(def) = self
            .relations_for(to_type)
            .iter()
            .find(|r| r.target_type == from_type && (r.to_label == label || r.from_label == label))
        {
            return Some(ResolvedRelation {
                swap: true,
                canonical_label: def.to_label.clone(),
            });
        }
        None
    }

    /// Restrict the pack to the given type ids (the `--types` CLI filter /
    /// `entity_type_filter` of the extractor contract). An empty filter
    /// means "no restriction" and returns the pack unchanged, rather than
    /// an empty pack that would silently suppress every extraction.
    pub fn filtered(&self, type_ids: &[String]) -> OntologyPack {
        if type_ids.is_empty() {
            return self.clone();
        }
        let allowed: std::collections::HashSet<&str> =
            type_ids.iter().map(|s| s.as_str()).collect();
        OntologyPack {
            types: self
                .types
                .iter()
                .filter(|(id, _)| allowed.contains(id.as_str()))
                .map(|(id, def)| (id.clone(), def.clone()))
                .collect(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Files that are part of the pack directory but are never type definitions.
fn is_excluded_filename(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "prompt_template.md" || lower == "readme.md"
}

pub struct OntologyLoader;

impl OntologyLoader {
    /// Load every `.md` file in `dir` except the excluded filenames,
    /// merging them into one `OntologyPack`. Missing directory is fatal;
    /// individual file parse problems are recorded as warnings and the
    /// offending file is skipped.
    pub fn load(dir: impl AsRef<Path>) -> Result<OntologyPack, OntologyError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(OntologyError::MissingDirectory(dir.display().to_string()));
        }

        let mut pack = OntologyPack::default();
        let mut entries: Vec<_> = std::fs::read_dir(dir)
            .map_err(|source| OntologyError::Io {
                path: dir.display().to_string(),
                source,
            })?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("md"))
            .collect();
        entries.sort();

        for path in entries {
            let file_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            if is_excluded_filename(&file_name) {
                continue;
            }

            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    pack.warnings
                        .push(format!("skipping {}: read error: {}", path.display(), e));
                    continue;
                }
            };

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string();

            let (def, file_warnings) = parse_type_def(&content, &stem);
            for w in file_warnings {
                pack.warnings
                    .push(format!("{}: {}", path.display(), w));
            }

            if pack.types.contains_key(&def.id) {
                pack.warnings.push(format!(
                    "duplicate entity type id '{}' in {} — last wins",
                    def.id,
                    path.display()
                ));
            }
            pack.types.insert(def.id.clone(), def);
        }

        Ok(pack)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Description,
    Relations,
    Examples,
}

/// Parse a single type-definition file's content. Never fails outright:
/// missing sections just leave the corresponding field empty, and
/// malformed relation lines are skipped with a warning.
fn parse_type_def(content: &str, default_id: &str) -> (EntityTypeDef, Vec<String>) {
    let mut id = default_id.to_string();
    let mut name = String::new();
    let mut description_lines: Vec<String> = Vec::new();
    let mut relations = Vec::new();
    let mut examples = Vec::new();
    let mut warnings = Vec::new();
    let mut section = Section::None;

    for (lineno, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();

        if let Some(rest) = line.strip_prefix("# ID:") {
            let value = rest.trim();
            if !value.is_empty() {
                id = value.to_string();
            }
            section = Section::None;
            continue;
        }
        if let Some(rest) = line.strip_prefix("## Name:") {
            name = rest.trim().to_string();
            section = Section::None;
            continue;
        }
        if line.trim_start_matches('#').trim() == "Description"
            && line.starts_with("## Description")
        {
            section = Section::Description;
            continue;
        }
        if line.starts_with("## Relations") {
            section = Section::Relations;
            continue;
        }
        if line.starts_with("## Examples") {
            section = Section::Examples;
            continue;
        }
        // Any other heading ends whatever section we were in.
        if line.starts_with('#') {
            section = Section::None;
            continue;
        }
        if line.is_empty() {
            continue;
        }

        match section {
            Section::Description => description_lines.push(line.to_string()),
            Section::Relations => match parse_relation_line(line) {
                Some(rel) => relations.push(rel),
                None => warnings.push(format!(
                    "line {}: malformed relation line, expected 'target : TO_LABEL : FROM_LABEL': {}",
                    lineno + 1,
                    line
                )),
            },
            Section::Examples => {
                let example = line.trim_start_matches('-').trim().to_string();
                if !example.is_empty() {
                    examples.push(example);
                }
            }
            Section::None => {}
        }
    }

    let def = EntityTypeDef {
        id,
        name,
        description: description_lines.join(" "),
        relations,
        examples,
        raw_markdown: content.to_string(),
    };
    (def, warnings)
}

/// Parse a `target_type : TO_LABEL : FROM_LABEL` relation line.
fn parse_relation_line(line: &str) -> Option<RelationDef> {
    let parts: Vec<&str> = line.split(':').map(|p| p.trim()).collect();
    if parts.len() != 3 {
        return None;
    }
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(RelationDef {
        target_type: parts[0].to_string(),
        to_label: parts[1].to_string(),
        from_label: parts[2].to_string(),
    })
}
