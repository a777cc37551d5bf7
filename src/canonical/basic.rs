//! Basic name normalization

use regex_lite::Regex;
use std::sync::OnceLock;

fn parens_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\([^)]*\)").unwrap())
}

fn non_alnum_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9 \-]").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Lowercase, strip parenthesized runs, drop everything but alphanumerics,
/// spaces and hyphens, collapse whitespace, trim. `name` itself is left
/// untouched by the caller; this only produces `normalized_name`.
pub fn normalize_basic(name: &str) -> String {
    let lowered = name.to_lowercase();
    let no_parens = parens_re().replace_all(&lowered, "");
    let stripped = non_alnum_re().replace_all(&no_parens, "");
    let collapsed = whitespace_re().replace_all(&stripped, " ");
    collapsed.trim().to_string()
}
