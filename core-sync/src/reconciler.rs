//! # Library Reconciliation
//!
//! One scan brings the catalog in line with the disk in two phases.
//!
//! ## Phase A: removal
//!
//! Every stored comic is checked against the filesystem. A comic is stale when
//! its file is gone, when it no longer lies under a watch root, or when the
//! file's modification time differs from the stored one. Stale comics are
//! deleted with a tombstone, all in one transaction. A modified file is
//! therefore removed here and picked up again as new in phase B.
//!
//! ## Phase B: discovery
//!
//! All files under the watch roots that are not in the catalog are read
//! through the [`MetadataExtractor`], oldest first, and written in batches of
//! `CoreConfig::batch_size`. Files the extractor rejects or fails on are
//! skipped, as are files whose path is not valid UTF-8: the catalog stores
//! paths as text and phase A must find the same file again.
//!
//! ## Cancellation
//!
//! The token is checked between files in both phases. Batches already
//! committed stay; the batch in flight is discarded and the scan reports
//! [`SyncError::Cancelled`].

use core_library::models::{now_millis, ComicId, ComicStamp};
use core_library::Catalog;
use core_metadata::hash::content_hash;
use core_metadata::{Extraction, MetadataExtractor};
use core_runtime::CoreConfig;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use walkdir::WalkDir;

use crate::dictionary::EntityDictionaryBuilder;
use crate::error::{Result, SyncError};
use crate::ingestor::{BulkIngestor, PendingComic};
use crate::status::{StatusHandle, StatusReporter};

/// Totals of one completed scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub removed: u64,
    /// Candidate files handed to the extractor
    pub scanned: u64,
    pub added: u64,
    /// Candidates not recognized or failing extraction
    pub skipped: u64,
    pub failed_batches: u64,
}

impl ScanReport {
    pub fn changed(&self) -> bool {
        self.removed > 0 || self.added > 0
    }
}

/// A file found under a watch root that the catalog does not know yet.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    path: PathBuf,
    filesize: i64,
    mod_ts: i64,
}

pub struct Reconciler {
    config: Arc<CoreConfig>,
    catalog: Catalog,
    extractor: Arc<dyn MetadataExtractor>,
    dictionary: EntityDictionaryBuilder,
    ingestor: BulkIngestor,
    status: StatusReporter,
}

impl Reconciler {
    pub fn new(
        config: Arc<CoreConfig>,
        catalog: Catalog,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Self {
        Self {
            dictionary: EntityDictionaryBuilder::new(catalog.clone()),
            ingestor: BulkIngestor::new(catalog.clone()),
            config,
            catalog,
            extractor,
            status: StatusReporter::new(),
        }
    }

    pub fn status(&self) -> StatusHandle {
        self.status.handle()
    }

    /// Run one full reconciliation scan.
    #[instrument(skip_all, fields(roots = self.config.watch_roots.len()))]
    pub async fn run_scan(&self, cancel: &CancellationToken) -> Result<ScanReport> {
        info!("Library scan started");
        self.status.begin_scan();

        match self.reconcile(cancel).await {
            Ok(report) => {
                let finished_at = now_millis();
                if report.changed() {
                    if let Err(e) = self.catalog.info.touch_last_updated(finished_at).await {
                        warn!(error = %e, "Failed to record catalog update time");
                    }
                }
                self.status.finish(Some(finished_at));
                info!(
                    removed = report.removed,
                    scanned = report.scanned,
                    added = report.added,
                    skipped = report.skipped,
                    failed_batches = report.failed_batches,
                    "Library scan complete"
                );
                Ok(report)
            }
            Err(SyncError::Cancelled) => {
                self.status.finish(None);
                info!("Library scan cancelled");
                Err(SyncError::Cancelled)
            }
            Err(e) => {
                self.status.finish(None);
                error!(error = %e, "Library scan failed");
                Err(e)
            }
        }
    }

    async fn reconcile(&self, cancel: &CancellationToken) -> Result<ScanReport> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let mut report = ScanReport {
            removed: self.remove_stale(cancel).await?,
            ..Default::default()
        };

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        self.discover(cancel, &mut report).await?;
        Ok(report)
    }

    /// Phase A. Returns the number of comics tombstoned.
    #[instrument(skip_all)]
    async fn remove_stale(&self, cancel: &CancellationToken) -> Result<u64> {
        self.status.set_detail("Checking for removed comics");
        let stamps = self.catalog.comics.list_stamps().await?;
        let total = stamps.len();

        let config = Arc::clone(&self.config);
        let token = cancel.clone();
        let stale = tokio::task::spawn_blocking(move || find_stale(&config, stamps, &token))
            .await
            .map_err(|e| SyncError::Internal(format!("stale check panicked: {}", e)))??;

        if stale.is_empty() {
            debug!(checked = total, "No stale comics");
            return Ok(0);
        }

        let ts = now_millis();
        let mut tx = self.catalog.writer.begin().await?;
        let mut removed = 0;

        for id in &stale {
            if cancel.is_cancelled() {
                tx.rollback().await?;
                return Err(SyncError::Cancelled);
            }

            match tx.remove_comic(*id, ts).await {
                Ok(true) => removed += 1,
                Ok(false) => debug!(id = %id, "Comic already gone"),
                Err(e) => {
                    error!(id = %id, error = %e, "Failed to remove comic");
                    self.status
                        .set_detail(format!("Failed to remove stale comics: {}", e));
                    tx.rollback().await?;
                    return Ok(0);
                }
            }
        }

        if let Err(e) = tx.commit().await {
            error!(error = %e, "Failed to commit comic removals");
            self.status
                .set_detail(format!("Failed to remove stale comics: {}", e));
            return Ok(0);
        }

        self.status.record_removed(removed);
        info!(removed, checked = total, "Removed stale comics");
        Ok(removed)
    }

    /// Phase B.
    #[instrument(skip_all)]
    async fn discover(&self, cancel: &CancellationToken, report: &mut ScanReport) -> Result<()> {
        self.status.set_detail("Looking for new comics");
        let known: HashSet<String> = self.catalog.comics.list_paths().await?.into_iter().collect();

        let roots = self.config.watch_roots.clone();
        let token = cancel.clone();
        let candidates = tokio::task::spawn_blocking(move || find_candidates(&roots, &known, &token))
            .await
            .map_err(|e| SyncError::Internal(format!("library walk panicked: {}", e)))??;

        info!(candidates = candidates.len(), "Discovered unindexed files");

        let batch_size = self.config.batch_size;
        let mut batch = Vec::with_capacity(batch_size.min(candidates.len()));

        for candidate in candidates {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let path_text = candidate.path.display().to_string();
            report.scanned += 1;
            self.status.record_scanned(&path_text);

            match self.extractor.extract(&candidate.path).await {
                Ok(Extraction::Metadata(metadata)) => {
                    let hash = self.hash_if_enabled(&candidate.path).await;
                    batch.push(PendingComic {
                        path: candidate.path,
                        filesize: candidate.filesize,
                        mod_ts: candidate.mod_ts,
                        hash,
                        metadata,
                    });
                }
                Ok(Extraction::NotRecognized) => {
                    debug!(path = %path_text, "Not a comic, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(path = %path_text, error = %e, "Failed to read comic, skipping");
                    report.skipped += 1;
                }
            }

            if report.scanned % batch_size as u64 == 0 {
                self.flush(&mut batch, cancel, report).await?;
            }
        }

        self.flush(&mut batch, cancel, report).await
    }

    async fn flush(
        &self,
        batch: &mut Vec<PendingComic>,
        cancel: &CancellationToken,
        report: &mut ScanReport,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let records = std::mem::take(batch);

        let dictionary = match self.dictionary.build(&records).await {
            Ok(dictionary) => dictionary,
            Err(e) => {
                error!(error = %e, records = records.len(), "Failed to prepare entity names");
                self.status
                    .set_detail(format!("Failed to save {} comics: {}", records.len(), e));
                report.failed_batches += 1;
                return Ok(());
            }
        };

        match self
            .ingestor
            .ingest(&records, &dictionary, &self.status, cancel)
            .await
        {
            Ok(outcome) if outcome.committed => {
                report.added += outcome.added;
                Ok(())
            }
            Ok(_) => {
                report.failed_batches += 1;
                Ok(())
            }
            Err(SyncError::Cancelled) => Err(SyncError::Cancelled),
            Err(e) => {
                error!(error = %e, records = records.len(), "Failed to write comic batch");
                self.status
                    .set_detail(format!("Failed to save {} comics: {}", records.len(), e));
                report.failed_batches += 1;
                Ok(())
            }
        }
    }

    async fn hash_if_enabled(&self, path: &Path) -> Option<String> {
        if !self.config.compute_hashes {
            return None;
        }

        let owned = path.to_path_buf();
        match tokio::task::spawn_blocking(move || content_hash(&owned)).await {
            Ok(Ok(hash)) => Some(hash),
            Ok(Err(e)) => {
                warn!(path = %path.display(), error = %e, "Failed to hash comic");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Hashing task failed");
                None
            }
        }
    }
}

/// Modification time of `meta` in epoch milliseconds, 0 if unavailable.
pub(crate) fn modified_millis(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .map(|time| chrono::DateTime::<chrono::Utc>::from(time).timestamp_millis())
        .unwrap_or(0)
}

fn is_stale(config: &CoreConfig, stamp: &ComicStamp) -> bool {
    let path = Path::new(&stamp.path);

    if !config.is_under_watch_root(path) {
        return true;
    }

    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => modified_millis(&meta) != stamp.mod_ts,
        _ => true,
    }
}

fn find_stale(
    config: &CoreConfig,
    stamps: Vec<ComicStamp>,
    cancel: &CancellationToken,
) -> Result<Vec<ComicId>> {
    let mut stale = Vec::new();
    for stamp in stamps {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if is_stale(config, &stamp) {
            debug!(path = %stamp.path, id = %stamp.id, "Comic is stale");
            stale.push(stamp.id);
        }
    }
    Ok(stale)
}

/// Walk every root and collect regular files not in `known`, oldest first.
fn find_candidates(
    roots: &[PathBuf],
    known: &HashSet<String>,
    cancel: &CancellationToken,
) -> Result<Vec<Candidate>> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for root in roots {
        if !root.is_dir() {
            warn!(root = %root.display(), "Watch root does not exist, skipping");
            continue;
        }

        for entry in WalkDir::new(root).follow_links(false) {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            // Stored paths must round-trip to the same file in phase A.
            let Some(key) = path.to_str() else {
                warn!(path = %path.display(), "Skipping file with a non UTF-8 path");
                continue;
            };
            if known.contains(key) || !seen.insert(key.to_string()) {
                continue;
            }

            match entry.metadata() {
                Ok(meta) => candidates.push(Candidate {
                    path: path.to_path_buf(),
                    filesize: i64::try_from(meta.len()).unwrap_or(i64::MAX),
                    mod_ts: modified_millis(&meta),
                }),
                Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable file"),
            }
        }
    }

    candidates.sort_by(|a, b| a.mod_ts.cmp(&b.mod_ts).then_with(|| a.path.cmp(&b.path)));
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    fn config_for(root: &Path) -> CoreConfig {
        CoreConfig::builder()
            .database_path("/tmp/unused.db")
            .watch_root(root)
            .build()
            .unwrap()
    }

    fn touch(path: &Path, secs: i64) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"comic").unwrap();
        set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
    }

    #[test]
    fn test_candidates_sorted_by_mtime_then_path() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("c.cbz"), 3_000);
        touch(&dir.path().join("sub/b.cbz"), 1_000);
        touch(&dir.path().join("a.cbz"), 2_000);
        touch(&dir.path().join("z.cbz"), 2_000);

        let found = find_candidates(
            &[dir.path().to_path_buf()],
            &HashSet::new(),
            &CancellationToken::new(),
        )
        .unwrap();

        let names: Vec<_> = found
            .iter()
            .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["b.cbz", "a.cbz", "z.cbz", "c.cbz"]);
        assert_eq!(found[0].mod_ts, 1_000_000);
        assert_eq!(found[0].filesize, 5);
    }

    #[test]
    fn test_candidates_exclude_known_and_overlapping_roots() {
        let dir = TempDir::new().unwrap();
        let known_path = dir.path().join("old.cbz");
        touch(&known_path, 1_000);
        touch(&dir.path().join("nested/new.cbz"), 1_000);

        let known: HashSet<String> = [known_path.to_string_lossy().into_owned()].into();
        let roots = vec![
            dir.path().to_path_buf(),
            dir.path().join("nested"),
            dir.path().join("missing"),
        ];

        let found = find_candidates(&roots, &known, &CancellationToken::new()).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].path.ends_with("nested/new.cbz"));
    }

    #[cfg(unix)]
    #[test]
    fn test_candidates_skip_non_utf8_paths() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        touch(&dir.path().join(OsStr::from_bytes(b"bad\xff.cbz")), 1_000);
        touch(&dir.path().join("good.cbz"), 2_000);

        let found = find_candidates(
            &[dir.path().to_path_buf()],
            &HashSet::new(),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(found.len(), 1);
        assert!(found[0].path.ends_with("good.cbz"));
    }

    #[test]
    fn test_staleness_rules() {
        let dir = TempDir::new().unwrap();
        let config = config_for(dir.path());
        let path = dir.path().join("a.cbz");
        touch(&path, 5_000);

        let stamp = |path: &Path, mod_ts| ComicStamp {
            id: ComicId(1),
            path: path.to_string_lossy().into_owned(),
            mod_ts,
        };

        assert!(!is_stale(&config, &stamp(&path, 5_000_000)));
        assert!(is_stale(&config, &stamp(&path, 4_000_000)));
        assert!(is_stale(&config, &stamp(&dir.path().join("gone.cbz"), 0)));

        let outside = TempDir::new().unwrap();
        let foreign = outside.path().join("b.cbz");
        touch(&foreign, 5_000);
        assert!(is_stale(&config, &stamp(&foreign, 5_000_000)));
    }

    #[test]
    fn test_find_stale_honours_cancellation() {
        let dir = TempDir::new().unwrap();
        let config = config_for(dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stamps = vec![ComicStamp {
            id: ComicId(1),
            path: "/nowhere/a.cbz".to_string(),
            mod_ts: 0,
        }];
        assert!(matches!(
            find_stale(&config, stamps, &cancel),
            Err(SyncError::Cancelled)
        ));
    }

    #[test]
    fn test_report_changed() {
        assert!(!ScanReport::default().changed());
        assert!(ScanReport {
            removed: 1,
            ..Default::default()
        }
        .changed());
    }
}
