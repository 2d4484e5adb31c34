//! Named entity repository trait and implementation

use crate::error::Result;
use crate::models::{name_key, EntityKind, NamedEntity};
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

/// Read access to the character/team/location/story arc/genre/tag/person/role
/// tables. Rows are created in bulk by
/// [`CatalogTransaction::insert_entity_names`](crate::catalog::CatalogTransaction::insert_entity_names).
#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// All names stored for `kind`.
    async fn names(&self, kind: EntityKind) -> Result<Vec<String>>;

    /// All rows stored for `kind`.
    async fn load(&self, kind: EntityKind) -> Result<Vec<NamedEntity>>;

    async fn count(&self, kind: EntityKind) -> Result<i64>;

    /// Case-insensitive lookup.
    ///
    /// Names that differ only in ASCII case hit the unique index. Anything
    /// else costs a table scan; bulk callers should use [`load`](Self::load).
    async fn find_by_name(&self, kind: EntityKind, name: &str) -> Result<Option<NamedEntity>>;
}

pub struct SqliteEntityRepository {
    pool: SqlitePool,
}

impl SqliteEntityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityRepository for SqliteEntityRepository {
    async fn names(&self, kind: EntityKind) -> Result<Vec<String>> {
        let sql = format!("SELECT name FROM {}", kind.table());
        let rows: Vec<(String,)> = query_as(&sql).fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn load(&self, kind: EntityKind) -> Result<Vec<NamedEntity>> {
        let sql = format!("SELECT id, name FROM {} ORDER BY id", kind.table());
        let rows = query_as::<_, NamedEntity>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count(&self, kind: EntityKind) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
        let (count,): (i64,) = query_as(&sql).fetch_one(&self.pool).await?;

        Ok(count)
    }

    async fn find_by_name(&self, kind: EntityKind, name: &str) -> Result<Option<NamedEntity>> {
        let sql = format!(
            "SELECT id, name FROM {} WHERE name = ? COLLATE NOCASE",
            kind.table()
        );
        let indexed = query_as::<_, NamedEntity>(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        if indexed.is_some() {
            return Ok(indexed);
        }

        // NOCASE only folds ASCII, so a miss falls back to comparing folded keys.
        let key = name_key(name);
        let entity = self
            .load(kind)
            .await?
            .into_iter()
            .find(|entity| name_key(&entity.name) == key);

        Ok(entity)
    }
}
