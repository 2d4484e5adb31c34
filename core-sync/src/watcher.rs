//! Filesystem watching
//!
//! One recursive OS watch per configured root. Notifications are treated as
//! an opaque "something changed" signal: the event kind and paths are never
//! trusted, the next scan works out what actually happened.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

use crate::debouncer::DebounceHandle;
use crate::error::{Result, SyncError};

/// Live watches over the library roots. Dropping it stops watching.
pub struct LibraryWatcher {
    watched: Vec<PathBuf>,
    // Never read, but dropping it deregisters every OS watch.
    _watcher: RecommendedWatcher,
}

impl LibraryWatcher {
    /// Watch every root that exists, forwarding notifications to `debounce`.
    ///
    /// Missing roots are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Watcher`] if the platform watcher cannot be created.
    pub fn start(roots: &[PathBuf], debounce: DebounceHandle) -> Result<Self> {
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    trace!(kind = ?event.kind, "Filesystem change");
                    debounce.notify();
                }
                Err(e) => warn!(error = %e, "Filesystem watcher error"),
            },
            notify::Config::default(),
        )
        .map_err(|e| SyncError::Watcher(format!("failed to create filesystem watcher: {}", e)))?;

        let mut watched = Vec::with_capacity(roots.len());
        for root in roots {
            if !root.is_dir() {
                warn!(root = %root.display(), "Watch root does not exist, not watching");
                continue;
            }

            match watcher.watch(root, RecursiveMode::Recursive) {
                Ok(()) => {
                    debug!(root = %root.display(), "Watching library root");
                    watched.push(root.clone());
                }
                Err(e) => warn!(root = %root.display(), error = %e, "Failed to watch root"),
            }
        }

        info!(roots = watched.len(), "Filesystem watcher started");

        Ok(Self {
            watched,
            _watcher: watcher,
        })
    }

    pub fn watched_roots(&self) -> &[PathBuf] {
        &self.watched
    }

    pub fn is_watching(&self, root: &Path) -> bool {
        self.watched.iter().any(|r| r == root)
    }
}

impl std::fmt::Debug for LibraryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryWatcher")
            .field("watched", &self.watched)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_missing_root_is_skipped() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("not-there");
        let (handle, _rx) = DebounceHandle::channel();

        let watcher = LibraryWatcher::start(&[missing.clone(), dir.path().to_path_buf()], handle)
            .unwrap();

        assert!(!watcher.is_watching(&missing));
        assert!(watcher.is_watching(dir.path()));
        assert_eq!(watcher.watched_roots().len(), 1);
    }

    #[tokio::test]
    async fn test_file_creation_signals_debouncer() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("marvel");
        std::fs::create_dir(&nested).unwrap();
        let (handle, mut rx) = DebounceHandle::channel();

        let _watcher = LibraryWatcher::start(&[dir.path().to_path_buf()], handle).unwrap();
        std::fs::write(nested.join("a.cbz"), b"comic").unwrap();

        let signal = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(signal, Some(()));
    }
}
