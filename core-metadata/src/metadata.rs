//! Metadata record produced by a [`MetadataExtractor`](crate::MetadataExtractor).

use serde::{Deserialize, Serialize};

/// Descriptive metadata of one comic file.
///
/// Every field is optional; extractors fill in what the file carries. The
/// six multi-valued fields hold free text with names separated by commas,
/// exactly as found in the file. File size and modification time are not
/// part of the record: the sync engine reads those from the filesystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComicMetadata {
    pub series: Option<String>,
    /// Issue designation as printed, e.g. `"12"`, `"1.5"`, `"½"`, `"7AU"`
    pub issue: Option<String>,
    pub title: Option<String>,
    pub publisher: Option<String>,
    pub imprint: Option<String>,
    pub year: Option<i32>,
    pub month: Option<i32>,
    pub day: Option<i32>,
    pub volume: Option<i32>,
    pub page_count: Option<i32>,
    pub comments: Option<String>,
    pub weblink: Option<String>,

    pub characters: Option<String>,
    pub teams: Option<String>,
    pub locations: Option<String>,
    pub story_arcs: Option<String>,
    pub genres: Option<String>,
    pub tags: Option<String>,

    pub credits: Vec<CreditInfo>,
}

/// One creator credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditInfo {
    pub person: String,
    pub role: String,
}

impl CreditInfo {
    pub fn new(person: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            person: person.into(),
            role: role.into(),
        }
    }
}
