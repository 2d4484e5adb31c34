//! Comic repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{Comic, ComicId, ComicStamp, CreditName, EntityKind};
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

/// Comic repository interface for data access operations
#[async_trait]
pub trait ComicRepository: Send + Sync {
    /// Find a comic by its ID
    ///
    /// # Returns
    /// - `Ok(Some(comic))` if found
    /// - `Ok(None)` if not found
    async fn find_by_id(&self, id: ComicId) -> Result<Option<Comic>>;

    /// Find a comic by its absolute path
    async fn find_by_path(&self, path: &str) -> Result<Option<Comic>>;

    /// Id, path and stored modification time of every comic.
    async fn list_stamps(&self) -> Result<Vec<ComicStamp>>;

    /// Paths of every comic.
    async fn list_paths(&self) -> Result<Vec<String>>;

    async fn count(&self) -> Result<i64>;

    /// Names of the `kind` entities attached to a comic, sorted.
    ///
    /// # Errors
    /// Returns `InvalidInput` for `Person` and `Role`, which are only
    /// reachable through [`credits`](Self::credits).
    async fn entity_names(&self, id: ComicId, kind: EntityKind) -> Result<Vec<String>>;

    /// Credits of a comic as person/role names, sorted by role then person.
    async fn credits(&self, id: ComicId) -> Result<Vec<CreditName>>;
}

/// SQLite implementation of ComicRepository
pub struct SqliteComicRepository {
    pool: SqlitePool,
}

impl SqliteComicRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ComicRepository for SqliteComicRepository {
    async fn find_by_id(&self, id: ComicId) -> Result<Option<Comic>> {
        let comic = query_as::<_, Comic>("SELECT * FROM comics WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(comic)
    }

    async fn find_by_path(&self, path: &str) -> Result<Option<Comic>> {
        let comic = query_as::<_, Comic>("SELECT * FROM comics WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        Ok(comic)
    }

    async fn list_stamps(&self) -> Result<Vec<ComicStamp>> {
        let stamps = query_as::<_, ComicStamp>("SELECT id, path, mod_ts FROM comics ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(stamps)
    }

    async fn list_paths(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = query_as("SELECT path FROM comics")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(path,)| path).collect())
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM comics")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn entity_names(&self, id: ComicId, kind: EntityKind) -> Result<Vec<String>> {
        let join_table = kind.join_table().ok_or_else(|| LibraryError::InvalidInput {
            field: "kind".to_string(),
            message: format!("{} is only reachable through credits", kind),
        })?;

        let sql = format!(
            "SELECT e.name FROM {entities} e \
             INNER JOIN {join_table} j ON j.entity_id = e.id \
             WHERE j.comic_id = ? ORDER BY e.name",
            entities = kind.table(),
        );

        let rows: Vec<(String,)> = query_as(&sql).bind(id).fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn credits(&self, id: ComicId) -> Result<Vec<CreditName>> {
        let credits = query_as::<_, CreditName>(
            r#"
            SELECT p.name AS person, r.name AS role
            FROM credits c
            INNER JOIN persons p ON p.id = c.person_id
            INNER JOIN roles r ON r.id = c.role_id
            WHERE c.comic_id = ?
            ORDER BY r.name, p.name
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(credits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn insert_comic(pool: &SqlitePool, path: &str, mod_ts: i64) -> ComicId {
        let result = sqlx::query(
            "INSERT INTO comics (path, folder, file, added_ts, mod_ts) VALUES (?, '/lib', 'x.cbz', 0, ?)",
        )
        .bind(path)
        .bind(mod_ts)
        .execute(pool)
        .await
        .unwrap();

        ComicId(result.last_insert_rowid())
    }

    #[tokio::test]
    async fn test_find_and_count() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteComicRepository::new(pool.clone());

        assert_eq!(repo.count().await.unwrap(), 0);
        let id = insert_comic(&pool, "/lib/x.cbz", 42).await;

        let by_id = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(by_id.path, "/lib/x.cbz");
        assert_eq!(by_id.mod_ts, 42);

        let by_path = repo.find_by_path("/lib/x.cbz").await.unwrap().unwrap();
        assert_eq!(by_path.id, id);
        assert!(repo.find_by_path("/lib/missing.cbz").await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_stamps_in_id_order() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteComicRepository::new(pool.clone());

        let a = insert_comic(&pool, "/lib/a.cbz", 1).await;
        let b = insert_comic(&pool, "/lib/b.cbz", 2).await;

        let stamps = repo.list_stamps().await.unwrap();
        assert_eq!(
            stamps,
            vec![
                ComicStamp { id: a, path: "/lib/a.cbz".to_string(), mod_ts: 1 },
                ComicStamp { id: b, path: "/lib/b.cbz".to_string(), mod_ts: 2 },
            ]
        );

        let mut paths = repo.list_paths().await.unwrap();
        paths.sort();
        assert_eq!(paths, vec!["/lib/a.cbz", "/lib/b.cbz"]);
    }

    #[tokio::test]
    async fn test_entity_names_rejects_credit_kinds() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteComicRepository::new(pool.clone());
        let id = insert_comic(&pool, "/lib/a.cbz", 1).await;

        assert!(repo.entity_names(id, EntityKind::Genre).await.unwrap().is_empty());
        assert!(matches!(
            repo.entity_names(id, EntityKind::Person).await,
            Err(LibraryError::InvalidInput { .. })
        ));
    }
}
