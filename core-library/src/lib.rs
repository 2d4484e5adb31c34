//! # Comic Catalog Module
//!
//! Owns the persisted comic catalog and provides repository patterns for
//! data access.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite database schema, migrations and catalog identity
//! - Repositories for comics, named entities, tombstones and catalog info
//! - Transactional write sessions used by the scan pipeline

pub mod catalog;
pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use catalog::{Catalog, CatalogTransaction, CatalogWriter, SqliteCatalogWriter};
pub use error::{LibraryError, Result};
