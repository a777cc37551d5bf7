//! Thin HTML→`Document` extraction
//!
//! Stands in for the excluded faithful HTML-to-Markdown converter: good
//! enough to give the orchestrator a concrete `Document` producer to
//! discover files and hash against, not a faithful rendering of Confluence
//! markup. A real deployment swaps this for the dedicated converter without
//! touching any downstream module — everything past this point only sees
//! `Document`.

use crate::graph::{DocId, Document, Link, LinkKind, Namespace};
use scraper::{Html, Selector};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub struct HtmlDocumentParser;

impl HtmlDocumentParser {
    /// Parse one HTML file on disk into a `Document`. `source_path` is
    /// recorded verbatim; `doc_id` is derived from it per `DocId::from_path`.
    pub fn parse_file(
        namespace: &Namespace,
        source_path: &Path,
    ) -> Result<Document, ParseError> {
        let raw = std::fs::read_to_string(source_path).map_err(|source| ParseError::Io {
            path: source_path.display().to_string(),
            source,
        })?;
        Ok(Self::parse_str(
            namespace,
            source_path,
            &source_path.display().to_string(),
            &raw,
        ))
    }

    /// Parse already-loaded HTML content. Exposed separately so tests (and
    /// callers that already have the bytes) don't need a file on disk.
    pub fn parse_str(
        namespace: &Namespace,
        path_for_doc_id: &Path,
        source_path: &str,
        html: &str,
    ) -> Document {
        let parsed = Html::parse_document(html);

        let title = Self::extract_title(&parsed).unwrap_or_else(|| {
            path_for_doc_id
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("untitled")
                .to_string()
        });
        let breadcrumb = Self::extract_breadcrumb(&parsed);
        let links = Self::extract_links(&parsed);
        let text = Self::extract_text(&parsed);

        let doc_id = DocId::from_path(path_for_doc_id);
        Document::new(namespace.clone(), doc_id, source_path, title, text)
            .with_breadcrumb(breadcrumb)
            .with_links(links)
    }

    fn extract_title(doc: &Html) -> Option<String> {
        let selector = Selector::parse("title").ok()?;
        doc.select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    }

    /// Confluence exports commonly mark the page's path trail with a
    /// `.breadcrumbs` container of anchor text; fall back to nothing if
    /// absent rather than guessing.
    fn extract_breadcrumb(doc: &Html) -> Vec<String> {
        let Ok(selector) = Selector::parse(".breadcrumbs a, #breadcrumbs a") else {
            return Vec::new();
        };
        doc.select(&selector)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }

    fn extract_links(doc: &Html) -> Vec<Link> {
        let Ok(selector) = Selector::parse("a[href]") else {
            return Vec::new();
        };
        doc.select(&selector)
            .filter_map(|el| {
                let url = el.value().attr("href")?.to_string();
                if url.is_empty() || url.starts_with('#') {
                    return None;
                }
                let text = el.text().collect::<String>().trim().to_string();
                let kind = if url.starts_with("http://") || url.starts_with("https://") {
                    LinkKind::External
                } else {
                    LinkKind::Internal
                };
                Some(Link { url, text, kind })
            })
            .collect()
    }

    /// Concatenate visible text of the document body, collapsing runs of
    /// whitespace — a stand-in canonical "markdown" body.
    fn extract_text(doc: &Html) -> String {
        let selector = Selector::parse("body")
            .or_else(|_| Selector::parse("html"))
            .expect("'body'/'html' are valid CSS selectors");
        let body = doc.select(&selector).next();
        let raw = match body {
            Some(el) => el.text().collect::<Vec<_>>().join(" "),
            None => doc.root_element().text().collect::<Vec<_>>().join(" "),
        };
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
