//! # Catalog Write Sessions
//!
//! Every mutation made by the scan pipeline runs inside a
//! [`CatalogTransaction`]: removals with their tombstones, bulk entity
//! inserts, and comic rows with their associations. Dropping a transaction
//! without calling [`commit`](CatalogTransaction::commit) rolls it back.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let catalog = Catalog::sqlite(pool);
//!
//! let mut tx = catalog.writer.begin().await?;
//! tx.remove_comic(stale_id, now_millis()).await?;
//! tx.commit().await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Connection, QueryBuilder, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;

use crate::error::{LibraryError, Result};
use crate::models::{ComicId, EntityKind, NewComic};
use crate::repositories::{
    ComicRepository, DatabaseInfoRepository, DeletedComicRepository, EntityRepository,
    SqliteComicRepository, SqliteDatabaseInfoRepository, SqliteDeletedComicRepository,
    SqliteEntityRepository,
};

/// Rows per multi-row `INSERT`, kept well below SQLite's bound-variable limit.
const INSERT_CHUNK_SIZE: usize = 500;

/// Opens write sessions against the catalog.
#[async_trait]
pub trait CatalogWriter: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>>;
}

/// A single atomic unit of catalog writes.
#[async_trait]
pub trait CatalogTransaction: Send {
    /// Delete a comic and append a tombstone for it, stamped `ts`.
    ///
    /// Associations and credits go with the row. Returns `false` without
    /// writing a tombstone if no such comic exists.
    async fn remove_comic(&mut self, id: ComicId, ts: i64) -> Result<bool>;

    /// Insert the given names into the `kind` table, ignoring names that are
    /// already present. Returns the number of rows created.
    async fn insert_entity_names(&mut self, kind: EntityKind, names: &[String]) -> Result<u64>;

    /// Insert a comic row with its associations and credits.
    ///
    /// # Errors
    /// `InvalidInput` if the comic fails validation, `Database` on constraint
    /// violations such as a duplicate path.
    async fn insert_comic(&mut self, comic: &NewComic) -> Result<ComicId>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// SQLite implementation of [`CatalogWriter`]
pub struct SqliteCatalogWriter {
    pool: SqlitePool,
}

impl SqliteCatalogWriter {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogWriter for SqliteCatalogWriter {
    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteCatalogTransaction { tx: Some(tx) }))
    }
}

struct SqliteCatalogTransaction {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteCatalogTransaction {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Sqlite>> {
        self.tx.as_mut().ok_or(LibraryError::TransactionClosed)
    }
}

#[async_trait]
impl CatalogTransaction for SqliteCatalogTransaction {
    async fn remove_comic(&mut self, id: ComicId, ts: i64) -> Result<bool> {
        let tx = self.tx()?;

        let deleted = sqlx::query("DELETE FROM comics WHERE id = ?")
            .bind(id)
            .execute(&mut **tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("INSERT INTO deletedcomics (comic_id, ts) VALUES (?, ?)")
            .bind(id)
            .bind(ts)
            .execute(&mut **tx)
            .await?;

        Ok(true)
    }

    async fn insert_entity_names(&mut self, kind: EntityKind, names: &[String]) -> Result<u64> {
        let tx = self.tx()?;
        let mut inserted = 0;

        for chunk in names.chunks(INSERT_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("INSERT OR IGNORE INTO {} (name) ", kind.table()));
            builder.push_values(chunk, |mut row, name| {
                row.push_bind(name.as_str());
            });

            inserted += builder.build().execute(&mut **tx).await?.rows_affected();
        }

        debug!(kind = %kind, requested = names.len(), inserted, "Inserted entity names");
        Ok(inserted)
    }

    async fn insert_comic(&mut self, comic: &NewComic) -> Result<ComicId> {
        comic.validate().map_err(|message| LibraryError::InvalidInput {
            field: "Comic".to_string(),
            message,
        })?;

        let tx = self.tx()?;

        // A failed association insert must not leave the comic row behind.
        let mut savepoint = Connection::begin(&mut **tx).await?;
        match insert_comic_rows(&mut *savepoint, comic).await {
            Ok(id) => {
                savepoint.commit().await?;
                Ok(id)
            }
            Err(e) => {
                savepoint.rollback().await?;
                Err(e)
            }
        }
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let tx = self.tx.take().ok_or(LibraryError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        let tx = self.tx.take().ok_or(LibraryError::TransactionClosed)?;
        tx.rollback().await?;
        Ok(())
    }
}

/// Insert `comic` with its join and credit rows on `conn`.
async fn insert_comic_rows(conn: &mut SqliteConnection, comic: &NewComic) -> Result<ComicId> {
    let result = sqlx::query(
        r#"
        INSERT INTO comics (
            path, folder, file, series, issue, issue_num, date,
            year, month, day, volume, page_count, comments, publisher,
            title, imprint, weblink, filesize, hash, added_ts, mod_ts
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&comic.path)
    .bind(&comic.folder)
    .bind(&comic.file)
    .bind(&comic.series)
    .bind(&comic.issue)
    .bind(comic.issue_num)
    .bind(comic.date)
    .bind(comic.year)
    .bind(comic.month)
    .bind(comic.day)
    .bind(comic.volume)
    .bind(comic.page_count)
    .bind(&comic.comments)
    .bind(&comic.publisher)
    .bind(&comic.title)
    .bind(&comic.imprint)
    .bind(&comic.weblink)
    .bind(comic.filesize)
    .bind(&comic.hash)
    .bind(comic.added_ts)
    .bind(comic.mod_ts)
    .execute(&mut *conn)
    .await?;

    let id = ComicId(result.last_insert_rowid());

    for (kind, entity_ids) in &comic.associations {
        // validate() guarantees a join table for every associated kind
        let Some(join_table) = kind.join_table() else {
            continue;
        };
        if entity_ids.is_empty() {
            continue;
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("INSERT INTO {} (comic_id, entity_id) ", join_table));
        builder.push_values(entity_ids, |mut row, entity_id| {
            row.push_bind(id).push_bind(*entity_id);
        });
        builder.build().execute(&mut *conn).await?;
    }

    if !comic.credits.is_empty() {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO credits (comic_id, person_id, role_id) ");
        builder.push_values(&comic.credits, |mut row, credit| {
            row.push_bind(id)
                .push_bind(credit.person_id)
                .push_bind(credit.role_id);
        });
        builder.build().execute(&mut *conn).await?;
    }

    Ok(id)
}

/// The storage collaborators of the sync engine, bundled for injection.
#[derive(Clone)]
pub struct Catalog {
    pub comics: Arc<dyn ComicRepository>,
    pub entities: Arc<dyn EntityRepository>,
    pub deleted: Arc<dyn DeletedComicRepository>,
    pub info: Arc<dyn DatabaseInfoRepository>,
    pub writer: Arc<dyn CatalogWriter>,
}

impl Catalog {
    /// SQLite-backed catalog sharing one pool.
    pub fn sqlite(pool: SqlitePool) -> Self {
        Self {
            comics: Arc::new(SqliteComicRepository::new(pool.clone())),
            entities: Arc::new(SqliteEntityRepository::new(pool.clone())),
            deleted: Arc::new(SqliteDeletedComicRepository::new(pool.clone())),
            info: Arc::new(SqliteDatabaseInfoRepository::new(pool.clone())),
            writer: Arc::new(SqliteCatalogWriter::new(pool)),
        }
    }
}
