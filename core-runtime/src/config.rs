//! # Core Configuration Module
//!
//! Provides configuration management for the comic library sync engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance holding the catalog location, the watched folder trees and the
//! timing knobs of the scan pipeline. `build()` validates eagerly so that a
//! misconfigured engine fails before any worker is started.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/comics/catalog.db")
//!     .watch_root("/srv/comics")
//!     .watch_root("/mnt/archive/comics")
//!     .debounce_delay(Duration::from_secs(10))
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! Missing or out-of-range values produce an [`Error::Config`] naming the
//! builder method that fixes the problem.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Quiet period after the last filesystem event before a rescan is queued.
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_secs(30);
/// Number of scanned files between batch commits.
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// How long the worker blocks on the command queue before re-checking the stop token.
pub const DEFAULT_QUEUE_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Upper bound on waiting for the worker to finish during shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Core configuration for the sync engine.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Path to the SQLite catalog file
    pub database_path: PathBuf,

    /// Absolute, de-duplicated folder trees that are scanned recursively
    pub watch_roots: Vec<PathBuf>,

    pub debounce_delay: Duration,

    pub batch_size: usize,

    pub queue_poll_interval: Duration,

    pub shutdown_timeout: Duration,

    /// Start OS-level watchers on the roots
    pub enable_watcher: bool,

    /// Queue one scan as soon as the coordinator starts
    pub scan_on_start: bool,

    /// Compute a SHA-256 digest of each newly discovered file
    pub compute_hashes: bool,
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.batch_size == 0 {
            return Err(Error::Config(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.debounce_delay.is_zero() {
            return Err(Error::Config(
                "Debounce delay must be greater than zero".to_string(),
            ));
        }

        if self.queue_poll_interval.is_zero() {
            return Err(Error::Config(
                "Queue poll interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns true if `path` lies inside one of the configured watch roots.
    ///
    /// The comparison is per path component, so `/comics2/a.cbz` is not
    /// considered to be under `/comics`.
    pub fn is_under_watch_root(&self, path: &Path) -> bool {
        self.watch_roots.iter().any(|root| path.starts_with(root))
    }
}

/// Builder for [`CoreConfig`].
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    watch_roots: Vec<PathBuf>,
    debounce_delay: Option<Duration>,
    batch_size: Option<usize>,
    queue_poll_interval: Option<Duration>,
    shutdown_timeout: Option<Duration>,
    enable_watcher: Option<bool>,
    scan_on_start: Option<bool>,
    compute_hashes: bool,
}

impl CoreConfigBuilder {
    /// Sets the catalog database path (required).
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Adds a folder tree to watch and scan.
    pub fn watch_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.watch_roots.push(path.into());
        self
    }

    pub fn watch_roots<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.watch_roots.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn debounce_delay(mut self, delay: Duration) -> Self {
        self.debounce_delay = Some(delay);
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn queue_poll_interval(mut self, interval: Duration) -> Self {
        self.queue_poll_interval = Some(interval);
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    pub fn enable_watcher(mut self, enabled: bool) -> Self {
        self.enable_watcher = Some(enabled);
        self
    }

    pub fn scan_on_start(mut self, enabled: bool) -> Self {
        self.scan_on_start = Some(enabled);
        self
    }

    pub fn compute_hashes(mut self, enabled: bool) -> Self {
        self.compute_hashes = enabled;
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Relative watch roots are resolved against the current directory and
    /// duplicates are dropped, keeping first-seen order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the database path is missing, the current
    /// directory cannot be resolved, or a value is out of range.
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let mut watch_roots: Vec<PathBuf> = Vec::with_capacity(self.watch_roots.len());
        for root in self.watch_roots {
            let root = absolutize(root)?;
            if !watch_roots.contains(&root) {
                watch_roots.push(root);
            }
        }

        let config = CoreConfig {
            database_path,
            watch_roots,
            debounce_delay: self.debounce_delay.unwrap_or(DEFAULT_DEBOUNCE_DELAY),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            queue_poll_interval: self
                .queue_poll_interval
                .unwrap_or(DEFAULT_QUEUE_POLL_INTERVAL),
            shutdown_timeout: self.shutdown_timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT),
            enable_watcher: self.enable_watcher.unwrap_or(true),
            scan_on_start: self.scan_on_start.unwrap_or(true),
            compute_hashes: self.compute_hashes,
        };

        config.validate()?;

        Ok(config)
    }
}

fn absolutize(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }

    let cwd = std::env::current_dir()
        .map_err(|e| Error::Config(format!("Cannot resolve relative watch root: {}", e)))?;
    Ok(cwd.join(path))
}
