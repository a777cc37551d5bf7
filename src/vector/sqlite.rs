//! sqlite-backed vector sidecar
//!
//! Behind the `embeddings` feature, storage and nearest-neighbor search run
//! through a `vec0` virtual table (sqlite-vec), with embeddings
//! L2-normalized on insert so cosine similarity reduces to a dot product.
//! Without that feature there is no ONNX/sqlite-vec binary dependency
//! available, so this falls back to a plain table with brute-force cosine
//! similarity computed in Rust — correct, just not sublinear.

use super::traits::{cosine_similarity, VectorError, VectorMatch, VectorSidecar, VectorStats};
use crate::graph::Namespace;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteVectorSidecar {
    conn: Mutex<Connection>,
}

impl SqliteVectorSidecar {
    pub fn open(path: &Path) -> Result<Self, VectorError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, VectorError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, VectorError> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entity_vectors (
                id TEXT PRIMARY KEY,
                namespace TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_name TEXT NOT NULL,
                normalized_name TEXT NOT NULL,
                embedding BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_entity_vectors_ns_type
                ON entity_vectors(namespace, entity_type);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(feature = "embeddings")]
    fn register_vec_extension() {
        use std::sync::Once;
        static INIT: Once = Once::new();
        INIT.call_once(|| unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        });
    }

    /// Opt into the accelerated `vec0`-backed ANN path alongside the plain
    /// table. Only available with the `embeddings` feature; the plain
    /// table remains the source of truth either way.
    #[cfg(feature = "embeddings")]
    pub fn with_ann(path: &Path, dimensions: usize) -> Result<Self, VectorError> {
        Self::register_vec_extension();
        let conn = Connection::open(path)?;
        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS entity_vectors_ann USING vec0(
                namespace TEXT PARTITION KEY,
                entity_type TEXT,
                embedding float[{}]
            )",
            dimensions
        ))?;
        Self::init(conn)
    }
}

fn embedding_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

impl VectorSidecar for SqliteVectorSidecar {
    fn add_entity(
        &self,
        id: &str,
        entity_type: &str,
        entity_name: &str,
        normalized_name: &str,
        namespace: &Namespace,
        embedding: &[f32],
    ) -> Result<(), VectorError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO entity_vectors (id, namespace, entity_type, entity_name, normalized_name, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                entity_name = excluded.entity_name,
                normalized_name = excluded.normalized_name,
                embedding = excluded.embedding",
            rusqlite::params![
                id,
                namespace.as_str(),
                entity_type,
                entity_name,
                normalized_name,
                embedding_to_bytes(embedding),
            ],
        )?;
        Ok(())
    }

    fn search_similar(
        &self,
        entity_type: &str,
        namespace: &Namespace,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<VectorMatch>, VectorError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, entity_name, normalized_name, embedding FROM entity_vectors
             WHERE namespace = ?1 AND entity_type = ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![namespace.as_str(), entity_type], |row| {
            let id: String = row.get(0)?;
            let entity_name: String = row.get(1)?;
            let normalized_name: String = row.get(2)?;
            let bytes: Vec<u8> = row.get(3)?;
            Ok((id, entity_name, normalized_name, bytes))
        })?;

        let mut matches = Vec::new();
        for row in rows {
            let (id, entity_name, normalized_name, bytes) = row?;
            let candidate = bytes_to_embedding(&bytes);
            let score = cosine_similarity(embedding, &candidate);
            if score >= threshold {
                matches.push(VectorMatch {
                    id,
                    entity_type: entity_type.to_string(),
                    entity_name,
                    normalized_name,
                    score,
                });
            }
        }

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        matches.truncate(limit);
        Ok(matches)
    }

    fn delete_namespace(&self, namespace: &Namespace) -> Result<usize, VectorError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM entity_vectors WHERE namespace = ?1",
            rusqlite::params![namespace.as_str()],
        )?;
        Ok(n)
    }

    fn stats(&self) -> Result<VectorStats, VectorError> {
        let conn = self.conn.lock().unwrap();
        let vectors: i64 = conn.query_row("SELECT COUNT(*) FROM entity_vectors", [], |row| row.get(0))?;
        let namespaces: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT namespace) FROM entity_vectors",
            [],
            |row| row.get(0),
        )?;
        Ok(VectorStats {
            namespaces: namespaces as usize,
            vectors: vectors as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_search_finds_itself() {
        let sidecar = SqliteVectorSidecar::open_in_memory().unwrap();
        let ns = Namespace::from_string("acme");
        let vec = vec![1.0, 0.0, 0.0];
        sidecar
            .add_entity("acme:product:kd", "product", "Knowledge Discovery", "kd", &ns, &vec)
            .unwrap();

        let results = sidecar.search_similar("product", &ns, &vec, 5, 0.85).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "acme:product:kd");
        assert!(results[0].score > 0.99);
    }

    #[test]
    fn search_excludes_other_namespaces_and_types() {
        let sidecar = SqliteVectorSidecar::open_in_memory().unwrap();
        let ns_a = Namespace::from_string("a");
        let ns_b = Namespace::from_string("b");
        let vec = vec![1.0, 0.0, 0.0];
        sidecar.add_entity("a:product:x", "product", "X", "x", &ns_a, &vec).unwrap();
        sidecar.add_entity("b:product:x", "product", "X", "x", &ns_b, &vec).unwrap();
        sidecar.add_entity("a:team:x", "team", "X", "x", &ns_a, &vec).unwrap();

        let results = sidecar.search_similar("product", &ns_a, &vec, 5, 0.5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a:product:x");
    }

    #[test]
    fn delete_namespace_removes_only_that_namespace() {
        let sidecar = SqliteVectorSidecar::open_in_memory().unwrap();
        let ns_a = Namespace::from_string("a");
        let ns_b = Namespace::from_string("b");
        let vec = vec![1.0, 0.0, 0.0];
        sidecar.add_entity("a:product:x", "product", "X", "x", &ns_a, &vec).unwrap();
        sidecar.add_entity("b:product:x", "product", "X", "x", &ns_b, &vec).unwrap();

        let deleted = sidecar.delete_namespace(&ns_a).unwrap();
        assert_eq!(deleted, 1);
        let stats = sidecar.stats().unwrap();
        assert_eq!(stats.vectors, 1);
    }
}
