//! Name-list normalization shared by every extractor and the sync engine.

use std::collections::HashSet;

/// Collapse runs of whitespace and drop control characters.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

/// Split a comma-delimited list into normalized names.
///
/// Empty tokens are dropped and repeated names, compared ignoring case, are
/// kept once in their first spelling.
pub fn split_names(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split(',')
        .map(normalize_text)
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_lowercase()))
        .collect()
}

/// Same as [`split_names`] for an optional field.
pub fn split_optional(raw: Option<&str>) -> Vec<String> {
    raw.map(split_names).unwrap_or_default()
}

/// Roles are stored lowercase so that "Writer" and "writer" share one row.
pub fn normalize_role(role: &str) -> String {
    normalize_text(role).to_lowercase()
}
