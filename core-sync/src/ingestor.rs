//! Bulk ingestion of discovered comics
//!
//! Converts a batch of extracted records into catalog rows inside a single
//! transaction. Associations are resolved strictly through the batch's
//! [`EntityDictionary`].

use chrono::NaiveDate;
use core_library::models::{now_millis, CreditRef, EntityKind, NewComic};
use core_library::Catalog;
use core_metadata::names::split_optional;
use core_metadata::{ComicMetadata, IssueNumber};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::dictionary::{credit_names, tag_field, EntityDictionary};
use crate::error::{Result, SyncError};
use crate::status::StatusReporter;

/// A discovered file whose metadata has been read but not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingComic {
    pub path: PathBuf,
    pub filesize: i64,
    /// Modification time in epoch milliseconds, as observed on disk
    pub mod_ts: i64,
    pub hash: Option<String>,
    pub metadata: ComicMetadata,
}

/// Result of writing one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Comics stored by a committed batch
    pub added: u64,
    /// Records dropped individually
    pub rejected: u64,
    pub committed: bool,
}

pub struct BulkIngestor {
    catalog: Catalog,
}

impl BulkIngestor {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    /// Insert every record of `batch` and commit once.
    ///
    /// A record that cannot be built or inserted is logged and left out. A
    /// failed commit is reported through `status` and yields an outcome with
    /// `committed == false`; it is not an error.
    ///
    /// # Errors
    ///
    /// [`SyncError::Cancelled`] if `cancel` fires mid-batch (nothing of the
    /// batch is kept), or a library error if the transaction cannot be opened.
    #[instrument(skip_all, fields(records = batch.len()))]
    pub async fn ingest(
        &self,
        batch: &[PendingComic],
        dictionary: &EntityDictionary,
        status: &StatusReporter,
        cancel: &CancellationToken,
    ) -> Result<IngestOutcome> {
        let mut outcome = IngestOutcome::default();
        let added_ts = now_millis();
        let mut tx = self.catalog.writer.begin().await?;

        for record in batch {
            if cancel.is_cancelled() {
                tx.rollback().await?;
                status.rollback_added(outcome.added);
                return Err(SyncError::Cancelled);
            }

            let comic = match build_comic(record, dictionary, added_ts) {
                Ok(comic) => comic,
                Err(e) => {
                    error!(path = %record.path.display(), error = %e, "Dropping comic with unresolved entity");
                    outcome.rejected += 1;
                    continue;
                }
            };

            match tx.insert_comic(&comic).await {
                Ok(id) => {
                    debug!(path = %comic.path, id = %id, "Added comic");
                    outcome.added += 1;
                    status.record_added();
                }
                Err(e) => {
                    warn!(path = %comic.path, error = %e, "Failed to insert comic");
                    outcome.rejected += 1;
                }
            }
        }

        match tx.commit().await {
            Ok(()) => {
                outcome.committed = true;
            }
            Err(e) => {
                error!(error = %e, added = outcome.added, "Failed to commit comic batch");
                status.rollback_added(outcome.added);
                status.set_detail(format!("Failed to save {} comics: {}", outcome.added, e));
                outcome.added = 0;
            }
        }

        Ok(outcome)
    }
}

/// Build the row for `record`, resolving every name through `dictionary`.
pub fn build_comic(
    record: &PendingComic,
    dictionary: &EntityDictionary,
    added_ts: i64,
) -> Result<NewComic> {
    let meta = &record.metadata;

    let folder = record
        .path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file = record
        .path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut comic = NewComic {
        path: record.path.to_string_lossy().into_owned(),
        folder,
        file,
        series: meta.series.clone(),
        issue: meta.issue.clone(),
        issue_num: meta
            .issue
            .as_deref()
            .and_then(|issue| IssueNumber::parse(issue).as_f64()),
        date: cover_date(meta.year, meta.month, meta.day),
        year: meta.year,
        month: meta.month,
        day: meta.day,
        volume: meta.volume,
        page_count: meta.page_count,
        comments: meta.comments.clone(),
        publisher: meta.publisher.clone(),
        title: meta.title.clone(),
        imprint: meta.imprint.clone(),
        weblink: meta.weblink.clone(),
        filesize: record.filesize,
        hash: record.hash.clone(),
        added_ts,
        mod_ts: record.mod_ts,
        ..Default::default()
    };

    for kind in EntityKind::ASSOCIATED {
        for name in split_optional(tag_field(meta, kind)) {
            let id = dictionary.resolve(kind, &name)?;
            comic.associations.entry(kind).or_default().insert(id);
        }
    }

    for (person, role) in credit_names(meta) {
        comic.credits.insert(CreditRef {
            person_id: dictionary.resolve(EntityKind::Person, &person)?,
            role_id: dictionary.resolve(EntityKind::Role, &role)?,
        });
    }

    Ok(comic)
}

/// Cover date from its parts. Month and day default to 1; a year is
/// required and impossible dates yield `None`.
pub fn cover_date(year: Option<i32>, month: Option<i32>, day: Option<i32>) -> Option<NaiveDate> {
    let year = year?;
    let month = u32::try_from(month.unwrap_or(1)).ok()?;
    let day = u32::try_from(day.unwrap_or(1)).ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::EntityDictionaryBuilder;
    use async_trait::async_trait;
    use core_library::db::create_test_pool;
    use core_library::models::ComicId;
    use core_library::{CatalogTransaction, CatalogWriter, LibraryError};
    use core_metadata::CreditInfo;
    use std::sync::Arc;

    /// Writer whose transactions never commit.
    struct CommitRefused(Arc<dyn CatalogWriter>);

    #[async_trait]
    impl CatalogWriter for CommitRefused {
        async fn begin(&self) -> core_library::Result<Box<dyn CatalogTransaction>> {
            Ok(Box::new(RefusedTransaction(self.0.begin().await?)))
        }
    }

    struct RefusedTransaction(Box<dyn CatalogTransaction>);

    #[async_trait]
    impl CatalogTransaction for RefusedTransaction {
        async fn remove_comic(&mut self, id: ComicId, ts: i64) -> core_library::Result<bool> {
            self.0.remove_comic(id, ts).await
        }

        async fn insert_entity_names(
            &mut self,
            kind: EntityKind,
            names: &[String],
        ) -> core_library::Result<u64> {
            self.0.insert_entity_names(kind, names).await
        }

        async fn insert_comic(&mut self, comic: &NewComic) -> core_library::Result<ComicId> {
            self.0.insert_comic(comic).await
        }

        async fn commit(self: Box<Self>) -> core_library::Result<()> {
            self.0.rollback().await?;
            Err(LibraryError::TransactionClosed)
        }

        async fn rollback(self: Box<Self>) -> core_library::Result<()> {
            self.0.rollback().await
        }
    }

    fn record(path: &str, metadata: ComicMetadata) -> PendingComic {
        PendingComic {
            path: PathBuf::from(path),
            filesize: 2048,
            mod_ts: 1_000,
            hash: None,
            metadata,
        }
    }

    #[test]
    fn test_cover_date_defaults_and_rejects() {
        assert_eq!(
            cover_date(Some(1988), None, None),
            NaiveDate::from_ymd_opt(1988, 1, 1)
        );
        assert_eq!(
            cover_date(Some(1988), Some(7), Some(4)),
            NaiveDate::from_ymd_opt(1988, 7, 4)
        );
        assert_eq!(cover_date(None, Some(7), Some(4)), None);
        assert_eq!(cover_date(Some(1988), Some(2), Some(30)), None);
        assert_eq!(cover_date(Some(1988), Some(-1), None), None);
    }

    #[test]
    fn test_build_comic_fields() {
        let metadata = ComicMetadata {
            series: Some("Hellboy".to_string()),
            issue: Some("1½".to_string()),
            year: Some(1994),
            month: Some(13),
            ..Default::default()
        };

        let comic = build_comic(
            &record("/lib/dark horse/hellboy 1.cbz", metadata),
            &EntityDictionary::default(),
            5,
        )
        .unwrap();

        assert_eq!(comic.folder, "/lib/dark horse");
        assert_eq!(comic.file, "hellboy 1.cbz");
        assert_eq!(comic.issue_num, Some(1.5));
        assert_eq!(comic.date, None);
        assert_eq!(comic.month, Some(13));
        assert_eq!(comic.filesize, 2048);
        assert_eq!(comic.mod_ts, 1_000);
        assert_eq!(comic.added_ts, 5);
    }

    #[test]
    fn test_build_comic_with_unknown_name_fails() {
        let metadata = ComicMetadata {
            genres: Some("Horror".to_string()),
            ..Default::default()
        };

        let result = build_comic(
            &record("/lib/a.cbz", metadata),
            &EntityDictionary::default(),
            5,
        );
        assert!(matches!(result, Err(SyncError::MissingEntity { .. })));
    }

    #[tokio::test]
    async fn test_ingest_dedupes_associations() {
        let catalog = Catalog::sqlite(create_test_pool().await.unwrap());
        let batch = vec![record(
            "/lib/a.cbz",
            ComicMetadata {
                characters: Some("Bob, Alice, Bob".to_string()),
                credits: vec![
                    CreditInfo::new("Ann", "Writer"),
                    CreditInfo::new("Ann", "writer"),
                ],
                ..Default::default()
            },
        )];

        let dictionary = EntityDictionaryBuilder::new(catalog.clone())
            .build(&batch)
            .await
            .unwrap();
        let status = StatusReporter::new();
        let outcome = BulkIngestor::new(catalog.clone())
            .ingest(&batch, &dictionary, &status, &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.committed);
        assert_eq!(outcome.added, 1);
        assert_eq!(status.snapshot().added, 1);

        let comic = catalog.comics.find_by_path("/lib/a.cbz").await.unwrap().unwrap();
        let characters = catalog
            .comics
            .entity_names(comic.id, EntityKind::Character)
            .await
            .unwrap();
        assert_eq!(characters.len(), 2);
        assert_eq!(catalog.comics.credits(comic.id).await.unwrap().len(), 1);
        assert_eq!(catalog.entities.count(EntityKind::Character).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_ingest_skips_bad_record_keeps_rest() {
        let catalog = Catalog::sqlite(create_test_pool().await.unwrap());
        let good = record("/lib/good.cbz", ComicMetadata::default());
        let orphan = record(
            "/lib/orphan.cbz",
            ComicMetadata {
                teams: Some("Nobody".to_string()),
                ..Default::default()
            },
        );

        // The dictionary is built without the orphan's names.
        let dictionary = EntityDictionaryBuilder::new(catalog.clone())
            .build(std::slice::from_ref(&good))
            .await
            .unwrap();
        let outcome = BulkIngestor::new(catalog.clone())
            .ingest(
                &[good, orphan],
                &dictionary,
                &StatusReporter::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.rejected, 1);
        assert_eq!(catalog.comics.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ingest_cancelled_discards_batch() {
        let catalog = Catalog::sqlite(create_test_pool().await.unwrap());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = BulkIngestor::new(catalog.clone())
            .ingest(
                &[record("/lib/a.cbz", ComicMetadata::default())],
                &EntityDictionary::default(),
                &StatusReporter::new(),
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert_eq!(catalog.comics.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_commit_reports_and_takes_back_additions() {
        let mut catalog = Catalog::sqlite(create_test_pool().await.unwrap());
        catalog.writer = Arc::new(CommitRefused(Arc::clone(&catalog.writer)));
        let batch = vec![
            record("/lib/a.cbz", ComicMetadata::default()),
            record("/lib/b.cbz", ComicMetadata::default()),
        ];

        let status = StatusReporter::new();
        status.begin_scan();
        status.record_added();

        let outcome = BulkIngestor::new(catalog.clone())
            .ingest(
                &batch,
                &EntityDictionary::default(),
                &status,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!outcome.committed);
        assert_eq!(outcome.added, 0);
        assert_eq!(catalog.comics.count().await.unwrap(), 0);

        // Additions from earlier batches are kept.
        let snapshot = status.snapshot();
        assert_eq!(snapshot.added, 1);
        assert!(snapshot.detail.starts_with("Failed to save 2 comics"));
    }
}
