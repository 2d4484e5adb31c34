//! # Database Connection Pool Module
//!
//! Provides SQLite connection pooling configured for the comic catalog.
//!
//! ## Features
//!
//! - **WAL Mode**: Enabled for better concurrency (multiple readers, one writer)
//! - **Connection Pooling**: Configurable min/max connections with timeouts
//! - **Statement Caching**: Automatic prepared statement caching
//! - **Foreign Keys**: Enforced for referential integrity
//! - **Automatic Migrations**: Runs on initialization
//! - **Schema Check**: Refuses to open a catalog written by a different schema version
//! - **Catalog Identity**: Creates the `dbinfo` singleton on first open
//! - **Health Checks**: Connection validation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_library::db::{DatabaseConfig, create_pool};
//!
//! // Create a connection pool
//! let config = DatabaseConfig::new("/var/lib/comics/catalog.db");
//! let pool = create_pool(config).await?;
//!
//! let comics = SqliteComicRepository::new(pool.clone());
//! let total = comics.count().await?;
//! ```
//!
//! ## Testing
//!
//! For tests, use in-memory databases:
//!
//! ```rust,ignore
//! let pool = create_test_pool().await?;
//! ```

use crate::models::now_millis;
use crate::{LibraryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Schema version this build reads and writes.
pub const SCHEMA_VERSION: i64 = 1;

/// Where the catalog lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    /// Private in-memory catalog shared by every connection of one pool
    Memory,
}

/// Connection pool settings for the catalog.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub location: DatabaseLocation,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub max_lifetime: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    /// Prepared statements cached per connection
    pub statement_cache_capacity: usize,
}

impl DatabaseConfig {
    /// Catalog stored in the file at `database_path`, created on first open.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            location: DatabaseLocation::File(database_path.into()),
            min_connections: 1,
            max_connections: 4,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: Some(Duration::from_secs(30 * 60)),
            idle_timeout: Some(Duration::from_secs(10 * 60)),
            statement_cache_capacity: 64,
        }
    }

    /// In-memory catalog. Connections never expire so the data outlives
    /// individual checkouts.
    pub fn in_memory() -> Self {
        Self {
            location: DatabaseLocation::Memory,
            max_lifetime: None,
            idle_timeout: None,
            ..Self::new(PathBuf::new())
        }
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.statement_cache_capacity = capacity;
        self
    }

    fn connect_options(&self) -> Result<SqliteConnectOptions> {
        let options = match &self.location {
            DatabaseLocation::File(path) => SqliteConnectOptions::new().filename(path),
            DatabaseLocation::Memory => SqliteConnectOptions::from_str("sqlite::memory:")?,
        };

        Ok(options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true)
            .pragma("cache_size", "-32000")
            .statement_cache_capacity(self.statement_cache_capacity))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Display for DatabaseLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseLocation::File(path) => write!(f, "{}", path.display()),
            DatabaseLocation::Memory => f.write_str(":memory:"),
        }
    }
}

/// Open the catalog and bring it to a usable state.
///
/// Steps, in order: connect with WAL and foreign keys enabled, apply the
/// embedded migrations, check the persisted schema version, create the
/// catalog identity row when missing, then run a health check.
///
/// # Errors
///
/// - [`LibraryError::Database`] if the file cannot be opened or a query fails
/// - [`LibraryError::Migration`] if a migration cannot be applied
/// - [`LibraryError::SchemaMismatch`] if the catalog was written by a
///   different schema version; callers should treat this as fatal
///
/// # Examples
///
/// ```rust,ignore
/// use core_library::db::{create_pool, DatabaseConfig};
///
/// let pool = create_pool(DatabaseConfig::new("catalog.db").max_connections(8)).await?;
/// ```
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(
        location = %config.location,
        min_connections = config.min_connections,
        max_connections = config.max_connections,
        "Opening catalog database"
    );

    let connect_options = config.connect_options()?;

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create connection pool");
            LibraryError::Database(e)
        })?;

    debug!(connections = pool.size(), "Connection pool ready");

    run_migrations(&pool).await?;
    verify_schema_version(&pool).await?;
    ensure_database_info(&pool).await?;
    health_check(&pool).await?;

    Ok(pool)
}

/// In-memory catalog with migrations applied, for tests.
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    let config = DatabaseConfig::in_memory();
    create_pool(config).await
}

/// Apply the migrations embedded from `./migrations`.
async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Migration failed");
            LibraryError::Migration(e.to_string())
        })?;

    debug!("Catalog migrations applied");
    Ok(())
}

/// Compare the persisted schema version with [`SCHEMA_VERSION`].
async fn verify_schema_version(pool: &Pool<Sqlite>) -> Result<()> {
    let (found,): (i64,) = sqlx::query_as("SELECT version FROM schema_info WHERE id = 1")
        .fetch_one(pool)
        .await?;

    if found != SCHEMA_VERSION {
        warn!(expected = SCHEMA_VERSION, found, "Catalog schema version mismatch");
        return Err(LibraryError::SchemaMismatch {
            expected: SCHEMA_VERSION,
            found,
        });
    }

    Ok(())
}

/// Create the `dbinfo` singleton with a fresh catalog UUID on first open.
async fn ensure_database_info(pool: &Pool<Sqlite>) -> Result<()> {
    let now = now_millis();
    let result = sqlx::query(
        "INSERT OR IGNORE INTO dbinfo (id, uuid, created, last_updated) VALUES (1, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().simple().to_string())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        info!("Initialised new catalog identity");
    }

    Ok(())
}

async fn health_check(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| {
        warn!(error = %e, "Database health check failed");
        LibraryError::Database(e)
    })?;

    Ok(())
}
