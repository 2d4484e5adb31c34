//! # Repository Pattern Implementation
//!
//! Read-side access to the comic catalog. Writes made by the scan pipeline go
//! through [`CatalogWriter`](crate::catalog::CatalogWriter) instead, so that
//! every mutation happens inside an explicit transaction.
//!
//! ## Architecture
//!
//! - Traits define the interface for each repository
//! - SQLite implementations use sqlx runtime queries over a shared pool
//! - All operations return `Result<T>` for error handling
//!
//! ## Available Repositories
//!
//! - `ComicRepository` - Comic rows, their associations and credits
//! - `EntityRepository` - The eight deduplicated name tables
//! - `DeletedComicRepository` - Append-only removal feed
//! - `DatabaseInfoRepository` - Catalog identity and freshness

pub mod comic;
pub mod database_info;
pub mod deleted_comic;
pub mod entity;

pub use comic::{ComicRepository, SqliteComicRepository};
pub use database_info::{DatabaseInfoRepository, SqliteDatabaseInfoRepository};
pub use deleted_comic::{DeletedComicRepository, SqliteDeletedComicRepository};
pub use entity::{EntityRepository, SqliteEntityRepository};
