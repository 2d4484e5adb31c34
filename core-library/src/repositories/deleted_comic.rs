//! Tombstone feed for external consumers that mirror the catalog.

use crate::error::Result;
use crate::models::DeletedComic;
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

#[async_trait]
pub trait DeletedComicRepository: Send + Sync {
    /// Tombstones written at or after `since` (epoch ms), oldest first.
    /// `None` returns the whole feed.
    async fn list_since(&self, since: Option<i64>) -> Result<Vec<DeletedComic>>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqliteDeletedComicRepository {
    pool: SqlitePool,
}

impl SqliteDeletedComicRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeletedComicRepository for SqliteDeletedComicRepository {
    async fn list_since(&self, since: Option<i64>) -> Result<Vec<DeletedComic>> {
        let rows = query_as::<_, DeletedComic>(
            "SELECT id, comic_id, ts FROM deletedcomics WHERE ts >= ? ORDER BY id",
        )
        .bind(since.unwrap_or(i64::MIN))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM deletedcomics")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
