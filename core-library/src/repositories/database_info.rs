//! Catalog identity singleton

use crate::error::{LibraryError, Result};
use crate::models::DatabaseInfo;
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

#[async_trait]
pub trait DatabaseInfoRepository: Send + Sync {
    async fn get(&self) -> Result<DatabaseInfo>;

    /// Record that the catalog content changed at `ts` (epoch ms).
    async fn touch_last_updated(&self, ts: i64) -> Result<()>;

    async fn schema_version(&self) -> Result<i64>;
}

pub struct SqliteDatabaseInfoRepository {
    pool: SqlitePool,
}

impl SqliteDatabaseInfoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DatabaseInfoRepository for SqliteDatabaseInfoRepository {
    async fn get(&self) -> Result<DatabaseInfo> {
        query_as::<_, DatabaseInfo>("SELECT uuid, created, last_updated FROM dbinfo WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LibraryError::NotFound {
                entity_type: "DatabaseInfo".to_string(),
                id: "1".to_string(),
            })
    }

    async fn touch_last_updated(&self, ts: i64) -> Result<()> {
        let result = query("UPDATE dbinfo SET last_updated = ? WHERE id = 1")
            .bind(ts)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity_type: "DatabaseInfo".to_string(),
                id: "1".to_string(),
            });
        }

        Ok(())
    }

    async fn schema_version(&self) -> Result<i64> {
        let (version,): (i64,) = query_as("SELECT version FROM schema_info WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(version)
    }
}
