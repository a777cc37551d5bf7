//! Dictionary normalization
//!
//! Loads a `key : expansion` file; a missing file is a no-op, not an error
//! — the dictionary is an optional refinement on top of basic normalization.

use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: HashMap<String, String>,
}

impl Dictionary {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Load `path`; any failure to read it (most commonly: it doesn't
    /// exist) yields an empty dictionary rather than an error.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        Self::parse(&content)
    }

    fn parse(content: &str) -> Self {
        let mut entries = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, expansion)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let expansion = expansion.trim();
            if key.is_empty() || expansion.is_empty() {
                continue;
            }
            entries.insert(super::basic::normalize_basic(key), expansion.to_string());
        }
        Self { entries }
    }

    /// Look up the normalized form of `name`; returns the canonical
    /// expansion if a dictionary entry matches.
    pub fn expand(&self, normalized_name: &str) -> Option<&str> {
        self.entries.get(normalized_name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_a_no_op() {
        let dict = Dictionary::load("/nonexistent/dictionary.txt");
        assert!(dict.expand("kd").is_none());
    }

    #[test]
    fn expands_known_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dict.txt");
        std::fs::write(&path, "KD : Knowledge Discovery\n# comment\nPE : Platform Engineering\n").unwrap();

        let dict = Dictionary::load(&path);
        assert_eq!(dict.expand("kd"), Some("Knowledge Discovery"));
        assert_eq!(dict.expand("pe"), Some("Platform Engineering"));
        assert!(dict.expand("unlisted").is_none());
    }

    #[test]
    fn blank_and_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dict.txt");
        std::fs::write(&path, "\n   \nno colon here\nempty_value :\n").unwrap();

        let dict = Dictionary::load(&path);
        assert!(dict.expand("empty_value").is_none());
    }
}
