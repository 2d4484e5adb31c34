//! # Library Sync Engine
//!
//! Keeps the comic catalog in line with the folder trees it indexes.
//!
//! ## Overview
//!
//! Filesystem notifications are collapsed by a debouncer into scan
//! commands. A single worker drains the command queue and runs a two-phase
//! reconciliation: stale comics are tombstoned, then unindexed files are read
//! through a [`MetadataExtractor`](core_metadata::MetadataExtractor) and
//! stored in batches.
//!
//! ## Components
//!
//! - **Watcher** (`watcher`): recursive OS watches over the library roots
//! - **Debouncer** (`debouncer`): turns bursts of change signals into one scan
//! - **Coordinator** (`coordinator`): command queue, worker lifecycle, shutdown
//! - **Reconciler** (`reconciler`): removal and discovery phases of a scan
//! - **Dictionary** (`dictionary`): per-batch name to id maps for named entities
//! - **Ingestor** (`ingestor`): batch insertion of new comics
//! - **Status** (`status`): pollable scan state and progress counters

pub mod coordinator;
pub mod debouncer;
pub mod dictionary;
pub mod error;
pub mod ingestor;
pub mod reconciler;
pub mod status;
pub mod watcher;

pub use coordinator::{ScanCommand, ScanCoordinator};
pub use debouncer::{DebounceHandle, EventDebouncer};
pub use dictionary::{EntityDictionary, EntityDictionaryBuilder};
pub use error::{Result, SyncError};
pub use ingestor::{BulkIngestor, IngestOutcome, PendingComic};
pub use reconciler::{Reconciler, ScanReport};
pub use status::{ScanState, ScanStatus, StatusHandle, StatusReporter};
pub use watcher::LibraryWatcher;
