//! # Comic Metadata Module
//!
//! Turns comic files into descriptive metadata for the catalog.
//!
//! ## Overview
//!
//! This module handles:
//! - The [`MetadataExtractor`] contract implemented by archive readers
//! - A filename-based extractor for files without embedded metadata
//! - Issue-number parsing into a sortable numeric key
//! - Splitting and normalizing comma-delimited name lists
//! - Content hashing for deduplication

pub mod error;
pub mod extractor;
pub mod hash;
pub mod issue;
pub mod metadata;
pub mod names;

pub use error::{MetadataError, Result};
pub use extractor::{Extraction, FilenameExtractor, MetadataExtractor};
pub use issue::IssueNumber;
pub use metadata::{ComicMetadata, CreditInfo};
