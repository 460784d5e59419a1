use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// File extensions offered by the file picker. Anything else is still read.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["txt", "csv", "md", "json"];

/// Turns a manual list into concepts: one per line, trimmed, blank lines dropped.
pub fn split_concepts(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Inverse of [`split_concepts`] for a normalized list.
pub fn join_concepts(concepts: &[String]) -> String {
    concepts.join("\n")
}

pub fn read_text_file(path: &Path) -> Result<String> {
    if !has_accepted_extension(path) {
        tracing::debug!(
            "{} does not have one of the usual extensions ({}); reading it anyway",
            path.display(),
            ACCEPTED_EXTENSIONS.join(", ")
        );
    }

    fs::read_to_string(path)
        .with_context(|| format!("failed to read text file at {}", path.display()))
}

pub fn has_accepted_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ACCEPTED_EXTENSIONS
                .iter()
                .any(|accepted| accepted.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}
