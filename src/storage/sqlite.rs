//! SQLite-backed graph store
//!
//! One database, four tables (`documents`, `entities`, `mentions`,
//! `typed_edges`), all namespace-scoped. Every multi-row write for a single
//! document — the doc upsert, entity upserts, mention edges, typed edges —
//! runs inside one transaction, with the connection held behind a mutex
//! and schema setup done via `execute_batch`.

use super::traits::{
    ClearCounts, EntitySummary, GraphStore, StorageError, StorageResult, TypedEdgeSummary,
    UpsertOutcome,
};
use crate::extraction::{DuplicateMarker, ExtractedEntity, ExtractedRelation};
use crate::graph::{DocId, Document, EntityId, Link, Namespace};
use crate::ontology::OntologyPack;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn find_entity_by_merge_key(
        tx: &Transaction,
        namespace: &Namespace,
        entity_type: &str,
        normalized_name: &str,
    ) -> StorageResult<Option<(EntityId, BTreeSet<String>)>> {
        tx.query_row(
            "SELECT id, aliases_json FROM entities
             WHERE namespace = ?1 AND entity_type = ?2 AND normalized_name = ?3",
            params![namespace.as_str(), entity_type, normalized_name],
            |row| {
                let id: String = row.get(0)?;
                let aliases_json: String = row.get(1)?;
                Ok((id, aliases_json))
            },
        )
        .optional()?
        .map(|(id, aliases_json)| {
            let aliases: BTreeSet<String> =
                serde_json::from_str(&aliases_json).unwrap_or_default();
            Ok((EntityId::from_string(id), aliases))
        })
        .transpose()
    }

    fn insert_entity(
        tx: &Transaction,
        namespace: &Namespace,
        entity_type: &str,
        name: &str,
        normalized_name: &str,
    ) -> StorageResult<EntityId> {
        let id = EntityId::new();
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO entities (id, namespace, entity_type, name, normalized_name, aliases_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.as_str(),
                namespace.as_str(),
                entity_type,
                name,
                normalized_name,
                "[]",
                now,
            ],
        )?;
        Ok(id)
    }

    fn write_aliases(
        tx: &Transaction,
        id: &EntityId,
        aliases: &BTreeSet<String>,
    ) -> StorageResult<()> {
        let json = serde_json::to_string(aliases)?;
        tx.execute(
            "UPDATE entities SET aliases_json = ?1 WHERE id = ?2",
            params![json, id.as_str()],
        )?;
        Ok(())
    }

    /// Resolve every non-tombstoned entity to a canonical graph `EntityId`,
    /// in place, preserving index order and list length. Also returns
    /// the set of indices for which a brand-new entity row was created.
    fn resolve_canonical(
        tx: &Transaction,
        namespace: &Namespace,
        entities: &[ExtractedEntity],
    ) -> StorageResult<(Vec<Option<EntityId>>, HashSet<usize>)> {
        let mut canonical: Vec<Option<EntityId>> = vec![None; entities.len()];
        let mut created: HashSet<usize> = HashSet::new();
        let mut merge_key_to_id: HashMap<(String, String), EntityId> = HashMap::new();
        let mut alias_additions: HashMap<EntityId, BTreeSet<String>> = HashMap::new();

        for (i, entity) in entities.iter().enumerate() {
            if entity.is_tombstoned() {
                continue;
            }
            match &entity.duplicate {
                DuplicateMarker::Tombstone => unreachable!("handled above"),
                DuplicateMarker::DuplicateOfGraph(id) => {
                    canonical[i] = Some(id.clone());
                    alias_additions
                        .entry(id.clone())
                        .or_default()
                        .insert(entity.name.clone());
                }
                DuplicateMarker::DuplicateOfBatch(_) => {
                    // resolved in the fixed-point pass below
                }
                DuplicateMarker::None => {
                    let key = (entity.type_id.clone(), entity.normalized_name.clone());
                    if let Some(id) = merge_key_to_id.get(&key) {
                        canonical[i] = Some(id.clone());
                        alias_additions
                            .entry(id.clone())
                            .or_default()
                            .extend(entity.aliases.iter().cloned());
                    } else if let Some((id, _existing_aliases)) = Self::find_entity_by_merge_key(
                        tx,
                        namespace,
                        &entity.type_id,
                        &entity.normalized_name,
                    )? {
                        canonical[i] = Some(id.clone());
                        merge_key_to_id.insert(key, id.clone());
                        alias_additions
                            .entry(id)
                            .or_default()
                            .extend(entity.aliases.iter().cloned());
                    } else {
                        let id = Self::insert_entity(
                            tx,
                            namespace,
                            &entity.type_id,
                            &entity.name,
                            &entity.normalized_name,
                        )?;
                        created.insert(i);
                        canonical[i] = Some(id.clone());
                        merge_key_to_id.insert(key, id.clone());
                        alias_additions
                            .entry(id)
                            .or_default()
                            .extend(entity.aliases.iter().cloned());
                    }
                }
            }
        }

        // Fixed-point pass: DuplicateOfBatch(j) may itself chain through
        // another DuplicateOfBatch before reaching a resolved slot.
        for _ in 0..entities.len() {
            let mut progressed = false;
            for (i, entity) in entities.iter().enumerate() {
                if canonical[i].is_some() || entity.is_tombstoned() {
                    continue;
                }
                if let DuplicateMarker::DuplicateOfBatch(j) = entity.duplicate {
                    if let Some(Some(id)) = canonical.get(j).cloned() {
                        canonical[i] = Some(id.clone());
                        alias_additions
                            .entry(id)
                            .or_default()
                            .insert(entity.name.clone());
                        progressed = true;
                    }
                }
            }
            if !progressed {
                break;
            }
        }

        for (i, entity) in entities.iter().enumerate() {
            if canonical[i].is_none() && !entity.is_tombstoned() {
                warn!(index = i, "entity duplicate marker never resolved; dropping mention");
            }
        }

        for (id, names) in alias_additions {
            let (_, mut existing) = Self::find_entity_by_merge_key_by_id(tx, &id)?;
            existing.extend(names);
            Self::write_aliases(tx, &id, &existing)?;
        }

        Ok((canonical, created))
    }

    fn find_entity_by_merge_key_by_id(
        tx: &Transaction,
        id: &EntityId,
    ) -> StorageResult<(EntityId, BTreeSet<String>)> {
        let aliases_json: String = tx.query_row(
            "SELECT aliases_json FROM entities WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        let aliases = serde_json::from_str(&aliases_json).unwrap_or_default();
        Ok((id.clone(), aliases))
    }

    fn upsert_mention(
        tx: &Transaction,
        namespace: &Namespace,
        doc_id: &DocId,
        entity_id: &EntityId,
        confidence: f32,
        evidence: &Option<String>,
    ) -> StorageResult<()> {
        tx.execute(
            "INSERT INTO mentions (namespace, doc_id, entity_id, confidence, evidence)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(namespace, doc_id, entity_id) DO UPDATE SET
                confidence = MAX(confidence, excluded.confidence),
                evidence = COALESCE(excluded.evidence, mentions.evidence)",
            params![
                namespace.as_str(),
                doc_id.as_str(),
                entity_id.as_str(),
                confidence,
                evidence,
            ],
        )?;
        Ok(())
    }

    fn upsert_typed_edge(
        tx: &Transaction,
        namespace: &Namespace,
        source: &EntityId,
        target: &EntityId,
        relationship: &str,
        confidence: f32,
        evidence: &Option<String>,
    ) -> StorageResult<()> {
        tx.execute(
            "INSERT INTO typed_edges (namespace, source, target, relationship, confidence, evidence)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(namespace, source, target, relationship) DO UPDATE SET
                confidence = MAX(confidence, excluded.confidence),
                evidence = COALESCE(excluded.evidence, typed_edges.evidence)",
            params![
                namespace.as_str(),
                source.as_str(),
                target.as_str(),
                relationship,
                confidence,
                evidence,
            ],
        )?;
        Ok(())
    }
}

impl GraphStore for SqliteStore {
    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                namespace TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                source_path TEXT NOT NULL,
                title TEXT NOT NULL,
                breadcrumb_json TEXT NOT NULL,
                links_json TEXT NOT NULL,
                text TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_processed_at TEXT NOT NULL,
                PRIMARY KEY (namespace, doc_id)
            );
            CREATE INDEX IF NOT EXISTS idx_documents_namespace ON documents(namespace);
            CREATE INDEX IF NOT EXISTS idx_documents_content_hash ON documents(namespace, doc_id, content_hash);

            CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                namespace TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                name TEXT NOT NULL,
                normalized_name TEXT NOT NULL,
                aliases_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(namespace, entity_type, normalized_name)
            );
            CREATE INDEX IF NOT EXISTS idx_entities_namespace ON entities(namespace);
            CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(namespace, entity_type);
            CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(namespace, name);

            CREATE TABLE IF NOT EXISTS mentions (
                namespace TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                confidence REAL NOT NULL,
                evidence TEXT,
                PRIMARY KEY (namespace, doc_id, entity_id)
            );
            CREATE INDEX IF NOT EXISTS idx_mentions_entity ON mentions(namespace, entity_id);

            CREATE TABLE IF NOT EXISTS typed_edges (
                namespace TEXT NOT NULL,
                source TEXT NOT NULL,
                target TEXT NOT NULL,
                relationship TEXT NOT NULL,
                confidence REAL NOT NULL,
                evidence TEXT,
                PRIMARY KEY (namespace, source, target, relationship)
            );
            CREATE INDEX IF NOT EXISTS idx_typed_edges_source ON typed_edges(namespace, source);
            CREATE INDEX IF NOT EXISTS idx_typed_edges_target ON typed_edges(namespace, target);",
        )?;
        Ok(())
    }

    fn find_document(
        &self,
        namespace: &Namespace,
        doc_id: &str,
    ) -> StorageResult<Option<Document>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT doc_id, source_path, title, breadcrumb_json, links_json, text,
                    content_hash, created_at, last_processed_at
             FROM documents WHERE namespace = ?1 AND doc_id = ?2",
            params![namespace.as_str(), doc_id],
            |row| {
                let doc_id: String = row.get(0)?;
                let source_path: String = row.get(1)?;
                let title: String = row.get(2)?;
                let breadcrumb_json: String = row.get(3)?;
                let links_json: String = row.get(4)?;
                let text: String = row.get(5)?;
                let content_hash: String = row.get(6)?;
                let created_at: String = row.get(7)?;
                let last_processed_at: String = row.get(8)?;
                Ok((
                    doc_id,
                    source_path,
                    title,
                    breadcrumb_json,
                    links_json,
                    text,
                    content_hash,
                    created_at,
                    last_processed_at,
                ))
            },
        )
        .optional()?
        .map(
            |(
                doc_id,
                source_path,
                title,
                breadcrumb_json,
                links_json,
                text,
                content_hash,
                created_at,
                last_processed_at,
            )| {
                let breadcrumb: Vec<String> =
                    serde_json::from_str(&breadcrumb_json).unwrap_or_default();
                let links: Vec<Link> = serde_json::from_str(&links_json).unwrap_or_default();
                Ok(Document {
                    doc_id: DocId::from_string(doc_id),
                    namespace: namespace.clone(),
                    source_path,
                    title,
                    breadcrumb,
                    links,
                    text,
                    content_hash,
                    created_at: parse_rfc3339(&created_at),
                    last_processed_at: parse_rfc3339(&last_processed_at),
                })
            },
        )
        .transpose()
    }

    fn upsert_document_batch(
        &self,
        namespace: &Namespace,
        document: &Document,
        entities: &[ExtractedEntity],
        relations: &[ExtractedRelation],
        ontology: &OntologyPack,
    ) -> StorageResult<UpsertOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let breadcrumb_json = serde_json::to_string(&document.breadcrumb)?;
        let links_json = serde_json::to_string(&document.links)?;
        tx.execute(
            "INSERT INTO documents (namespace, doc_id, source_path, title, breadcrumb_json,
                links_json, text, content_hash, created_at, last_processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(namespace, doc_id) DO UPDATE SET
                source_path = excluded.source_path,
                title = excluded.title,
                breadcrumb_json = excluded.breadcrumb_json,
                links_json = excluded.links_json,
                text = excluded.text,
                content_hash = excluded.content_hash,
                last_processed_at = excluded.last_processed_at",
            params![
                namespace.as_str(),
                document.doc_id.as_str(),
                document.source_path,
                document.title,
                breadcrumb_json,
                links_json,
                document.text,
                document.content_hash,
                document.created_at.to_rfc3339(),
                document.last_processed_at.to_rfc3339(),
            ],
        )?;

        let mut outcome = UpsertOutcome::default();
        let (canonical, created) = Self::resolve_canonical(&tx, namespace, entities)?;
        outcome.entities_created = created.len();
        let distinct_canonical: HashSet<&str> = canonical
            .iter()
            .filter_map(|c| c.as_ref())
            .map(|id| id.as_str())
            .collect();
        outcome.entities_updated = distinct_canonical.len().saturating_sub(created.len());

        let mut mentioned: HashSet<String> = HashSet::new();
        for (i, entity) in entities.iter().enumerate() {
            let Some(id) = &canonical[i] else { continue };
            if !mentioned.insert(id.as_str().to_string()) {
                continue;
            }
            let confidence = entity.confidence.unwrap_or(1.0);
            Self::upsert_mention(&tx, namespace, &document.doc_id, id, confidence, &entity.evidence)?;
            outcome.mentions_created += 1;
        }

        for relation in relations {
            let from_idx = relation.from_entity as usize;
            let to_idx = relation.to_entity as usize;
            let (Some(from_canonical), Some(to_canonical)) = (
                canonical.get(from_idx).cloned().flatten(),
                canonical.get(to_idx).cloned().flatten(),
            ) else {
                outcome.warnings.push(format!(
                    "dropping relation '{}': endpoint did not resolve to a canonical entity (from={}, to={})",
                    relation.relation_type, relation.from_entity, relation.to_entity
                ));
                continue;
            };

            let (source, target, relationship) = match (
                entities.get(from_idx).map(|e| e.type_id.as_str()),
                entities.get(to_idx).map(|e| e.type_id.as_str()),
            ) {
                (Some(from_type), Some(to_type)) => {
                    match ontology.resolve_direction(from_type, to_type, &relation.relation_type) {
                        Some(resolved) if resolved.swap => {
                            (to_canonical, from_canonical, resolved.canonical_label)
                        }
                        Some(resolved) => (from_canonical, to_canonical, resolved.canonical_label),
                        None => (from_canonical, to_canonical, relation.relation_type.clone()),
                    }
                }
                _ => (from_canonical, to_canonical, relation.relation_type.clone()),
            };

            let confidence = relation.confidence.unwrap_or(1.0);
            Self::upsert_typed_edge(
                &tx, namespace, &source, &target, &relationship, confidence, &relation.evidence,
            )?;
            outcome.relationships_created += 1;
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn merge_entities(
        &self,
        namespace: &Namespace,
        from: &EntityId,
        into: &EntityId,
    ) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let from_row = Self::find_entity_row(&tx, namespace, from)?;
        let Some((from_name, from_aliases)) = from_row else {
            // Already merged away; re-applying the same merge is a no-op.
            tx.commit()?;
            return Ok(());
        };

        tx.execute(
            "UPDATE OR IGNORE mentions SET entity_id = ?1 WHERE namespace = ?2 AND entity_id = ?3",
            params![into.as_str(), namespace.as_str(), from.as_str()],
        )?;
        // Resolve confidence conflicts left behind by the rename above: any
        // row that `OR IGNORE` skipped because `into` was already mentioned
        // by the same doc needs its confidence bumped manually, then the
        // stale `from` row removed.
        Self::merge_duplicate_mentions(&tx, namespace, into)?;
        tx.execute(
            "DELETE FROM mentions WHERE namespace = ?1 AND entity_id = ?2",
            params![namespace.as_str(), from.as_str()],
        )?;

        tx.execute(
            "UPDATE OR IGNORE typed_edges SET source = ?1 WHERE namespace = ?2 AND source = ?3",
            params![into.as_str(), namespace.as_str(), from.as_str()],
        )?;
        tx.execute(
            "UPDATE OR IGNORE typed_edges SET target = ?1 WHERE namespace = ?2 AND target = ?3",
            params![into.as_str(), namespace.as_str(), from.as_str()],
        )?;
        Self::merge_duplicate_typed_edges(&tx, namespace, into)?;
        tx.execute(
            "DELETE FROM typed_edges WHERE namespace = ?1 AND (source = ?2 OR target = ?2)",
            params![namespace.as_str(), from.as_str()],
        )?;

        let (_, mut into_aliases) = Self::find_entity_by_merge_key_by_id(&tx, into)?;
        into_aliases.insert(from_name);
        into_aliases.extend(from_aliases);
        Self::write_aliases(&tx, into, &into_aliases)?;

        tx.execute(
            "DELETE FROM entities WHERE namespace = ?1 AND id = ?2",
            params![namespace.as_str(), from.as_str()],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn clear_namespace(&self, namespace: &Namespace) -> StorageResult<ClearCounts> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let docs: i64 = tx.query_row(
            "SELECT COUNT(*) FROM documents WHERE namespace = ?1",
            params![namespace.as_str()],
            |r| r.get(0),
        )?;
        let entity_count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM entities WHERE namespace = ?1",
            params![namespace.as_str()],
            |r| r.get(0),
        )?;
        let mentions: i64 = tx.query_row(
            "SELECT COUNT(*) FROM mentions WHERE namespace = ?1",
            params![namespace.as_str()],
            |r| r.get(0),
        )?;
        let edges: i64 = tx.query_row(
            "SELECT COUNT(*) FROM typed_edges WHERE namespace = ?1",
            params![namespace.as_str()],
            |r| r.get(0),
        )?;

        tx.execute("DELETE FROM mentions WHERE namespace = ?1", params![namespace.as_str()])?;
        tx.execute("DELETE FROM typed_edges WHERE namespace = ?1", params![namespace.as_str()])?;
        tx.execute("DELETE FROM entities WHERE namespace = ?1", params![namespace.as_str()])?;
        tx.execute("DELETE FROM documents WHERE namespace = ?1", params![namespace.as_str()])?;
        tx.commit()?;

        Ok(ClearCounts {
            nodes_deleted: (docs + entity_count) as usize,
            edges_deleted: (mentions + edges) as usize,
            vector_entries_deleted: 0,
        })
    }

    fn entities_of_type_detailed(
        &self,
        namespace: &Namespace,
        entity_type: &str,
    ) -> StorageResult<Vec<EntitySummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT e.id, e.name, e.normalized_name, e.created_at,
                (SELECT COUNT(*) FROM mentions m WHERE m.namespace = e.namespace AND m.entity_id = e.id) +
                (SELECT COUNT(*) FROM typed_edges te WHERE te.namespace = e.namespace AND (te.source = e.id OR te.target = e.id))
                AS degree
             FROM entities e
             WHERE e.namespace = ?1 AND e.entity_type = ?2",
        )?;
        let rows = stmt.query_map(params![namespace.as_str(), entity_type], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let normalized_name: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            let degree: i64 = row.get(4)?;
            Ok(EntitySummary {
                id: EntityId::from_string(id),
                name,
                normalized_name,
                degree: degree as u32,
                created_at: parse_rfc3339(&created_at),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::from)
    }

    fn typed_edges(&self, namespace: &Namespace) -> StorageResult<Vec<TypedEdgeSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT source, target, relationship FROM typed_edges WHERE namespace = ?1",
        )?;
        let rows = stmt.query_map(params![namespace.as_str()], |row| {
            let source: String = row.get(0)?;
            let target: String = row.get(1)?;
            let relationship: String = row.get(2)?;
            Ok(TypedEdgeSummary {
                source: EntityId::from_string(source),
                target: EntityId::from_string(target),
                relationship,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::from)
    }
}

impl SqliteStore {
    fn find_entity_row(
        tx: &Transaction,
        namespace: &Namespace,
        id: &EntityId,
    ) -> StorageResult<Option<(String, BTreeSet<String>)>> {
        tx.query_row(
            "SELECT name, aliases_json FROM entities WHERE namespace = ?1 AND id = ?2",
            params![namespace.as_str(), id.as_str()],
            |row| {
                let name: String = row.get(0)?;
                let aliases_json: String = row.get(1)?;
                Ok((name, aliases_json))
            },
        )
        .optional()?
        .map(|(name, aliases_json)| {
            let aliases = serde_json::from_str(&aliases_json).unwrap_or_default();
            Ok((name, aliases))
        })
        .transpose()
    }

    /// After renaming `from`'s mentions to `into`, any doc that mentioned
    /// both now has two rows for the same `(namespace, doc_id, into)` key
    /// (the rename above used `OR IGNORE`, so the original `into` row
    /// survived and the renamed row was dropped). Recompute `into`'s row as
    /// the max confidence across whichever rows exist for `from` or `into`.
    fn merge_duplicate_mentions(
        tx: &Transaction,
        namespace: &Namespace,
        into: &EntityId,
    ) -> StorageResult<()> {
        tx.execute(
            "UPDATE mentions SET confidence = (
                SELECT MAX(m2.confidence) FROM mentions m2
                WHERE m2.namespace = mentions.namespace
                  AND m2.doc_id = mentions.doc_id
                  AND m2.entity_id = mentions.entity_id
             )
             WHERE namespace = ?1 AND entity_id = ?2",
            params![namespace.as_str(), into.as_str()],
        )?;
        Ok(())
    }

    fn merge_duplicate_typed_edges(
        tx: &Transaction,
        namespace: &Namespace,
        into: &EntityId,
    ) -> StorageResult<()> {
        tx.execute(
            "UPDATE typed_edges SET confidence = (
                SELECT MAX(t2.confidence) FROM typed_edges t2
                WHERE t2.namespace = typed_edges.namespace
                  AND t2.source = typed_edges.source
                  AND t2.target = typed_edges.target
                  AND t2.relationship = typed_edges.relationship
             )
             WHERE namespace = ?1 AND (source = ?2 OR target = ?2)",
            params![namespace.as_str(), into.as_str()],
        )?;
        Ok(())
    }
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl crate::canonical::EntityLookup for SqliteStore {
    fn entities_of_type(
        &self,
        namespace: &Namespace,
        entity_type: &str,
    ) -> Vec<(EntityId, String)> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match conn.prepare(
            "SELECT id, normalized_name FROM entities WHERE namespace = ?1 AND entity_type = ?2",
        ) {
            Ok(s) => s,
            Err(_) => return Vec::new(),
        };
        stmt.query_map(params![namespace.as_str(), entity_type], |row| {
            let id: String = row.get(0)?;
            let normalized_name: String = row.get(1)?;
            Ok((EntityId::from_string(id), normalized_name))
        })
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .unwrap_or_default()
    }

    fn find_by_normalized_name(
        &self,
        namespace: &Namespace,
        entity_type: &str,
        normalized_name: &str,
    ) -> Option<EntityId> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id FROM entities WHERE namespace = ?1 AND entity_type = ?2 AND normalized_name = ?3",
            params![namespace.as_str(), entity_type, normalized_name],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .ok()
        .flatten()
        .map(EntityId::from_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractedEntity;

    fn entity(type_id: &str, name: &str, normalized: &str) -> ExtractedEntity {
        let mut e = ExtractedEntity::new(type_id, name);
        e.normalized_name = normalized.to_string();
        e
    }

    fn doc(ns: &Namespace, id: &str, text: &str) -> Document {
        Document::new(ns.clone(), DocId::from_string(id), format!("{id}.html"), "Title", text)
    }

    /// `product --OWNED_BY--> engineering_team` is the only relation the
    /// defining type's file declares; `OWNS` is its reverse display label.
    fn ontology_with_product_owned_by_team() -> OntologyPack {
        use crate::ontology::{EntityTypeDef, RelationDef};
        use std::collections::BTreeMap;

        let mut types = BTreeMap::new();
        types.insert(
            "product".to_string(),
            EntityTypeDef {
                id: "product".to_string(),
                name: "Product".to_string(),
                description: String::new(),
                relations: vec![RelationDef {
                    target_type: "engineering_team".to_string(),
                    to_label: "OWNED_BY".to_string(),
                    from_label: "OWNS".to_string(),
                }],
                examples: Vec::new(),
                raw_markdown: String::new(),
            },
        );
        types.insert(
            "engineering_team".to_string(),
            EntityTypeDef {
                id: "engineering_team".to_string(),
                name: "Engineering Team".to_string(),
                description: String::new(),
                relations: Vec::new(),
                examples: Vec::new(),
                raw_markdown: String::new(),
            },
        );
        OntologyPack {
            types,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn upserting_same_doc_twice_with_same_hash_updates_in_place() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ns = Namespace::from_string("acme");
        let d = doc(&ns, "a", "hello");
        store.upsert_document_batch(&ns, &d, &[], &[], &OntologyPack::default()).unwrap();
        store.upsert_document_batch(&ns, &d, &[], &[], &OntologyPack::default()).unwrap();
        let found = store.find_document(&ns, "a").unwrap().unwrap();
        assert_eq!(found.content_hash, d.content_hash);
    }

    #[test]
    fn two_entities_with_same_merge_key_collapse_to_one_node() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ns = Namespace::from_string("acme");
        let d = doc(&ns, "a", "hello");
        let entities = vec![
            entity("product", "Knowledge Discovery", "knowledge discovery"),
            entity("product", "Knowledge Discovery", "knowledge discovery"),
        ];
        let outcome = store
            .upsert_document_batch(&ns, &d, &entities, &[], &OntologyPack::default())
            .unwrap();
        assert_eq!(outcome.entities_created, 1);
        assert_eq!(outcome.mentions_created, 1);
    }

    #[test]
    fn relation_resolves_through_canonical_indices() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ns = Namespace::from_string("acme");
        let d = doc(&ns, "a", "hello");
        let entities = vec![
            entity("product", "Knowledge Discovery", "knowledge discovery"),
            entity("engineering_team", "Platform Engineering", "platform engineering"),
        ];
        let relations = vec![ExtractedRelation {
            from_entity: 1,
            to_entity: 0,
            relation_type: "works_on".to_string(),
            confidence: Some(0.9),
            evidence: None,
        }];
        let outcome = store
            .upsert_document_batch(&ns, &d, &entities, &relations, &OntologyPack::default())
            .unwrap();
        assert_eq!(outcome.relationships_created, 1);
        assert!(outcome.warnings.is_empty());
        // The pack doesn't define "works_on" for either type, so the edge is
        // stored exactly as the extractor emitted it.
        let edges = store.typed_edges(&ns).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relationship, "works_on");
    }

    #[test]
    fn relation_is_normalized_to_the_ontologys_canonical_direction() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ns = Namespace::from_string("acme");
        let d = doc(&ns, "a", "hello");
        let entities = vec![
            entity("product", "Knowledge Discovery", "knowledge discovery"),
            entity("engineering_team", "Platform Engineering", "platform engineering"),
        ];
        let ontology = ontology_with_product_owned_by_team();

        // The extractor emits the relation backwards: team -> product.
        let relations = vec![ExtractedRelation {
            from_entity: 1,
            to_entity: 0,
            relation_type: "OWNED_BY".to_string(),
            confidence: Some(0.9),
            evidence: None,
        }];
        let outcome = store
            .upsert_document_batch(&ns, &d, &entities, &relations, &ontology)
            .unwrap();
        assert_eq!(outcome.relationships_created, 1);

        let product_id = store.entities_of_type_detailed(&ns, "product").unwrap()[0].id.clone();
        let team_id = store.entities_of_type_detailed(&ns, "engineering_team").unwrap()[0].id.clone();

        let edges = store.typed_edges(&ns).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source, product_id);
        assert_eq!(edges[0].target, team_id);
        assert_eq!(edges[0].relationship, "OWNED_BY");
    }

    #[test]
    fn relation_already_in_canonical_direction_is_left_unswapped() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ns = Namespace::from_string("acme");
        let d = doc(&ns, "a", "hello");
        let entities = vec![
            entity("product", "Knowledge Discovery", "knowledge discovery"),
            entity("engineering_team", "Platform Engineering", "platform engineering"),
        ];
        let ontology = ontology_with_product_owned_by_team();

        let relations = vec![ExtractedRelation {
            from_entity: 0,
            to_entity: 1,
            relation_type: "OWNED_BY".to_string(),
            confidence: Some(0.9),
            evidence: None,
        }];
        store
            .upsert_document_batch(&ns, &d, &entities, &relations, &ontology)
            .unwrap();

        let product_id = store.entities_of_type_detailed(&ns, "product").unwrap()[0].id.clone();
        let team_id = store.entities_of_type_detailed(&ns, "engineering_team").unwrap()[0].id.clone();

        let edges = store.typed_edges(&ns).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source, product_id);
        assert_eq!(edges[0].target, team_id);
    }

    #[test]
    fn duplicate_of_graph_absorbs_alias_and_emits_one_mention() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ns = Namespace::from_string("acme");
        let d1 = doc(&ns, "a", "hello");
        let first = vec![entity("product", "Knowledge Discovery", "knowledge discovery")];
        store.upsert_document_batch(&ns, &d1, &first, &[], &OntologyPack::default()).unwrap();

        let existing_id = {
            let summaries = store.entities_of_type_detailed(&ns, "product").unwrap();
            summaries[0].id.clone()
        };

        let d2 = doc(&ns, "b", "world");
        let mut second = vec![entity("product", "KD", "kd")];
        second[0].duplicate = DuplicateMarker::DuplicateOfGraph(existing_id.clone());
        let outcome = store.upsert_document_batch(&ns, &d2, &second, &[], &OntologyPack::default()).unwrap();
        assert_eq!(outcome.entities_created, 0);
        assert_eq!(outcome.mentions_created, 1);

        let summaries = store.entities_of_type_detailed(&ns, "product").unwrap();
        assert_eq!(summaries.len(), 1);
    }

    #[test]
    fn tombstoned_entity_produces_no_mention() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ns = Namespace::from_string("acme");
        let d = doc(&ns, "a", "hello");
        let mut entities = vec![entity("product", "Ghost", "ghost")];
        entities[0].duplicate = DuplicateMarker::Tombstone;
        let outcome = store.upsert_document_batch(&ns, &d, &entities, &[], &OntologyPack::default()).unwrap();
        assert_eq!(outcome.entities_created, 0);
        assert_eq!(outcome.mentions_created, 0);
    }

    #[test]
    fn merge_rewrites_edges_and_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ns = Namespace::from_string("acme");
        let d = doc(&ns, "a", "hello");
        let entities = vec![
            entity("product", "Knowledge Discovery", "knowledge discovery"),
            entity("product", "KD Classic", "kd classic"),
        ];
        store.upsert_document_batch(&ns, &d, &entities, &[], &OntologyPack::default()).unwrap();
        let summaries = store.entities_of_type_detailed(&ns, "product").unwrap();
        let a = summaries.iter().find(|s| s.normalized_name == "knowledge discovery").unwrap().id.clone();
        let b = summaries.iter().find(|s| s.normalized_name == "kd classic").unwrap().id.clone();

        store.merge_entities(&ns, &b, &a).unwrap();
        let after_first = store.entities_of_type_detailed(&ns, "product").unwrap();
        assert_eq!(after_first.len(), 1);

        // Re-applying is a no-op: `b` no longer exists.
        store.merge_entities(&ns, &b, &a).unwrap();
        let after_second = store.entities_of_type_detailed(&ns, "product").unwrap();
        assert_eq!(after_second.len(), 1);
    }

    #[test]
    fn clear_namespace_removes_everything_and_leaves_other_namespaces_alone() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ns_a = Namespace::from_string("a");
        let ns_b = Namespace::from_string("b");
        let entities = vec![entity("product", "X", "x")];
        store.upsert_document_batch(&ns_a, &doc(&ns_a, "d", "t"), &entities, &[], &OntologyPack::default()).unwrap();
        store.upsert_document_batch(&ns_b, &doc(&ns_b, "d", "t"), &entities, &[], &OntologyPack::default()).unwrap();

        let counts = store.clear_namespace(&ns_a).unwrap();
        assert!(counts.nodes_deleted > 0);
        assert!(store.find_document(&ns_a, "d").unwrap().is_none());
        assert!(store.find_document(&ns_b, "d").unwrap().is_some());
    }
}
