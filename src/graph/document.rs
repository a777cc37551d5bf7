//! Document: one immutable-after-creation node per ingested file

use super::ids::{DocId, Namespace};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a link in a document points within the corpus or leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Internal,
    External,
}

/// A single link extracted from a document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    pub text: String,
    pub kind: LinkKind,
}

/// A document ingested from the source corpus.
///
/// Created once per input file; immutable after creation except
/// `last_processed_at`. Merge key is `(namespace, doc_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: DocId,
    pub namespace: Namespace,
    pub source_path: String,
    pub title: String,
    /// Ordered sequence of path labels (e.g. breadcrumb trail in a wiki export).
    pub breadcrumb: Vec<String>,
    pub links: Vec<Link>,
    /// Canonical markdown body.
    pub text: String,
    /// SHA-256 over `text`, hex-encoded. Drives idempotent re-ingest skip.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_processed_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        namespace: Namespace,
        doc_id: DocId,
        source_path: impl Into<String>,
        title: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let content_hash = Self::hash_text(&text);
        let now = Utc::now();
        Self {
            doc_id,
            namespace,
            source_path: source_path.into(),
            title: title.into(),
            breadcrumb: Vec::new(),
            links: Vec::new(),
            text,
            content_hash,
            created_at: now,
            last_processed_at: now,
        }
    }

    pub fn with_breadcrumb(mut self, breadcrumb: Vec<String>) -> Self {
        self.breadcrumb = breadcrumb;
        self
    }

    pub fn with_links(mut self, links: Vec<Link>) -> Self {
        self.links = links;
        self
    }

    /// SHA-256 of `text`, hex-encoded.
    pub fn hash_text(text: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}
