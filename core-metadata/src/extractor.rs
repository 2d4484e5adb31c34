//! Metadata Extraction
//!
//! This module defines the [`MetadataExtractor`] contract used by the sync
//! engine to read comic files, plus [`FilenameExtractor`], which recognizes
//! comic files by extension and derives what it can from the file name.
//!
//! ## Overview
//!
//! - An extractor answers either "not a comic" or a [`ComicMetadata`] record
//! - Failures are errors; the sync engine logs them and skips the file
//! - Archive readers (CBZ/CBR with embedded ComicInfo) implement the same
//!   trait and can wrap `FilenameExtractor` as their fallback
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::{Extraction, FilenameExtractor, MetadataExtractor};
//! use std::path::Path;
//!
//! let extractor = FilenameExtractor::new();
//! match extractor.extract(Path::new("Saga_v2_013_(2014).cbz")).await? {
//!     Extraction::Metadata(meta) => println!("{:?} #{:?}", meta.series, meta.issue),
//!     Extraction::NotRecognized => {}
//! }
//! ```

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

use crate::error::{MetadataError, Result};
use crate::issue::IssueNumber;
use crate::metadata::ComicMetadata;
use crate::names::normalize_text;

/// Extensions recognized by [`FilenameExtractor::new`].
pub const DEFAULT_COMIC_EXTENSIONS: &[&str] = &["cbz", "cbr", "cb7", "cbt", "pdf"];

/// Outcome of reading one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The file is not a comic this extractor understands
    NotRecognized,
    Metadata(ComicMetadata),
}

/// Reads comic metadata from a file on disk.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Extract metadata from the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is recognized but
    /// corrupt. Callers treat errors as "skip this file".
    async fn extract(&self, path: &Path) -> Result<Extraction>;
}

/// Derives series, issue, volume and year from a comic's file name.
///
/// Handles the usual scene naming: underscores for spaces, `(2014)` for the
/// year, `v2`/`Vol. 2` for the volume, and a trailing `#12` or bare `012`
/// for the issue. Parenthesized and bracketed groups other than the year are
/// ignored.
#[derive(Debug, Clone)]
pub struct FilenameExtractor {
    extensions: BTreeSet<String>,
}

impl FilenameExtractor {
    pub fn new() -> Self {
        Self::with_extensions(DEFAULT_COMIC_EXTENSIONS.iter().copied())
    }

    /// Recognize only files whose extension is in `extensions`, ignoring case.
    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn recognizes(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_ascii_lowercase()))
    }

    /// Parse a file stem without touching the filesystem.
    pub fn parse_stem(stem: &str) -> ComicMetadata {
        let spaced = stem.replace('_', " ");
        let (text, year) = strip_groups(&spaced);

        let mut tokens: Vec<&str> = text.split_whitespace().collect();
        let volume = take_volume(&mut tokens);
        let issue = take_issue(&mut tokens);

        let series = normalize_text(
            tokens
                .join(" ")
                .trim_end_matches(|c: char| c == '-' || c.is_whitespace()),
        );

        ComicMetadata {
            series: if series.is_empty() {
                Some(normalize_text(&spaced))
            } else {
                Some(series)
            },
            issue,
            volume,
            year,
            ..Default::default()
        }
    }
}

impl Default for FilenameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataExtractor for FilenameExtractor {
    async fn extract(&self, path: &Path) -> Result<Extraction> {
        if !self.recognizes(path) {
            return Ok(Extraction::NotRecognized);
        }

        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MetadataError::FileNotFound(path.display().to_string())
            } else {
                MetadataError::Io(e)
            }
        })?;

        if !metadata.is_file() {
            return Ok(Extraction::NotRecognized);
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                MetadataError::ExtractionFailed(format!(
                    "File name is not valid UTF-8: {}",
                    path.display()
                ))
            })?;

        let parsed = Self::parse_stem(stem);
        debug!(
            path = %path.display(),
            series = ?parsed.series,
            issue = ?parsed.issue,
            "Derived metadata from file name"
        );

        Ok(Extraction::Metadata(parsed))
    }
}

/// Remove `(...)` and `[...]` groups, returning the remaining text and the
/// first group that reads as a plausible year.
fn strip_groups(text: &str) -> (String, Option<i32>) {
    let mut out = String::with_capacity(text.len());
    let mut year = None;
    let mut group = String::new();
    let mut closing: Option<char> = None;

    for c in text.chars() {
        match closing {
            Some(close) if c == close => {
                if year.is_none() {
                    year = parse_year(group.trim());
                }
                group.clear();
                closing = None;
                out.push(' ');
            }
            Some(_) => group.push(c),
            None if c == '(' => closing = Some(')'),
            None if c == '[' => closing = Some(']'),
            None => out.push(c),
        }
    }

    // An unterminated group is kept as plain text.
    if closing.is_some() {
        out.push_str(&group);
    }

    (out, year)
}

fn parse_year(text: &str) -> Option<i32> {
    if text.len() != 4 || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse::<i32>()
        .ok()
        .filter(|year| (1900..=2099).contains(year))
}

/// Remove a `v2`, `vol2`, `Vol. 2` or `Volume 2` marker.
fn take_volume(tokens: &mut Vec<&str>) -> Option<i32> {
    for idx in 0..tokens.len() {
        let lower = tokens[idx].to_ascii_lowercase();

        for prefix in ["volume", "vol.", "vol", "v"] {
            let Some(rest) = lower.strip_prefix(prefix) else {
                continue;
            };

            if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
                let volume = rest.parse().ok();
                tokens.remove(idx);
                return volume;
            }

            if rest.is_empty() && prefix != "v" {
                let next = tokens.get(idx + 1).and_then(|t| t.parse::<i32>().ok());
                if let Some(volume) = next {
                    tokens.drain(idx..=idx + 1);
                    return Some(volume);
                }
            }
        }
    }

    None
}

/// Remove the issue token: the last `#...` token, or else the last token
/// that starts with a number, provided something is left for the series.
fn take_issue(tokens: &mut Vec<&str>) -> Option<String> {
    if let Some(idx) = tokens.iter().rposition(|t| t.starts_with('#')) {
        let issue = tokens.remove(idx).trim_start_matches('#').to_string();
        return (!issue.is_empty()).then_some(issue);
    }

    if tokens.len() < 2 {
        return None;
    }

    let idx = tokens.iter().rposition(|t| {
        t.chars().next().is_some_and(|c| c.is_ascii_digit())
            && IssueNumber::parse(t).as_f64().is_some()
    })?;

    if idx == 0 {
        return None;
    }

    Some(tokens.remove(idx).to_string())
}
