//! # Scan Coordinator
//!
//! Owns the scan pipeline of a library: the command queue, the single worker
//! that drains it, and the filesystem watcher feeding it.
//!
//! ## Overview
//!
//! ```text
//! watcher callback ──signal──▶ debouncer ──Scan──┐
//!                                                ├──▶ queue ──▶ worker ──▶ Reconciler
//! request_scan() ───────────────────────Scan─────┘
//! ```
//!
//! - Exactly one scan runs at a time; the queue is the only guard
//! - Scan commands that pile up while a scan runs are folded into the next one
//! - Status is published through a [`StatusHandle`] that never waits on the worker
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::ScanCoordinator;
//! use core_metadata::FilenameExtractor;
//! use std::sync::Arc;
//!
//! let coordinator = ScanCoordinator::open(config, Arc::new(FilenameExtractor::new())).await?;
//! coordinator.start().await?;
//!
//! let status = coordinator.status();
//! println!("{}", status.snapshot().state);
//!
//! coordinator.stop().await?;
//! ```

use core_library::db::{create_pool, DatabaseConfig};
use core_library::Catalog;
use core_metadata::MetadataExtractor;
use core_runtime::CoreConfig;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::debouncer::EventDebouncer;
use crate::error::{Result, SyncError};
use crate::reconciler::Reconciler;
use crate::status::StatusHandle;
use crate::watcher::LibraryWatcher;

/// Work accepted by the scan worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCommand {
    /// Reconcile the catalog with the watch roots
    Scan,
}

/// Tasks and watches that exist only between `start` and `stop`.
struct ActiveWorker {
    worker: JoinHandle<()>,
    debouncer: Option<EventDebouncer>,
    watcher: Option<LibraryWatcher>,
}

pub struct ScanCoordinator {
    config: Arc<CoreConfig>,
    reconciler: Arc<Reconciler>,
    status: StatusHandle,
    commands: mpsc::UnboundedSender<ScanCommand>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<ScanCommand>>>,
    shutdown: CancellationToken,
    active: Mutex<Option<ActiveWorker>>,
}

impl ScanCoordinator {
    pub fn new(
        config: CoreConfig,
        catalog: Catalog,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Self {
        let config = Arc::new(config);
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&config), catalog, extractor));
        let status = reconciler.status();
        let (commands, receiver) = mpsc::unbounded_channel();

        Self {
            config,
            reconciler,
            status,
            commands,
            receiver: Mutex::new(Some(receiver)),
            shutdown: CancellationToken::new(),
            active: Mutex::new(None),
        }
    }

    /// Open (or create) the catalog at `config.database_path` and build a
    /// coordinator over it.
    pub async fn open(config: CoreConfig, extractor: Arc<dyn MetadataExtractor>) -> Result<Self> {
        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        Ok(Self::new(config, Catalog::sqlite(pool), extractor))
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Spawn the worker, start watching when enabled, and queue the initial
    /// scan when `scan_on_start` is set.
    ///
    /// # Errors
    ///
    /// [`SyncError::QueueClosed`] after [`stop`](Self::stop), or
    /// [`SyncError::Internal`] if the coordinator was already started.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(SyncError::QueueClosed);
        }

        let receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| SyncError::Internal("Scan coordinator already started".to_string()))?;

        let worker = tokio::spawn(run_worker(
            Arc::clone(&self.reconciler),
            receiver,
            self.shutdown.clone(),
            self.config.queue_poll_interval,
        ));

        let (debouncer, watcher) = if self.config.enable_watcher {
            let debouncer = EventDebouncer::spawn(
                self.config.debounce_delay,
                self.commands.clone(),
                self.shutdown.child_token(),
            );
            let watcher = match LibraryWatcher::start(&self.config.watch_roots, debouncer.handle()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!(error = %e, "Continuing without filesystem watching");
                    None
                }
            };
            (Some(debouncer), watcher)
        } else {
            (None, None)
        };

        *self.active.lock().await = Some(ActiveWorker {
            worker,
            debouncer,
            watcher,
        });

        info!(
            roots = self.config.watch_roots.len(),
            watching = self.config.enable_watcher,
            "Scan coordinator started"
        );

        if self.config.scan_on_start {
            self.request_scan()?;
        }

        Ok(())
    }

    /// Queue a scan.
    pub fn request_scan(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(SyncError::QueueClosed);
        }
        self.commands
            .send(ScanCommand::Scan)
            .map_err(|_| SyncError::QueueClosed)?;
        debug!("Scan requested");
        Ok(())
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancel any running scan, stop watching and wait for the worker.
    ///
    /// The wait is bounded by `CoreConfig::shutdown_timeout`; a worker that is
    /// still busy after that is left to finish on its own.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        self.shutdown.cancel();

        let Some(active) = self.active.lock().await.take() else {
            debug!("Scan coordinator was not running");
            return Ok(());
        };

        drop(active.watcher);
        if let Some(debouncer) = active.debouncer {
            debouncer.shutdown().await;
        }

        match timeout(self.config.shutdown_timeout, active.worker).await {
            Ok(Ok(())) => {
                info!("Scan coordinator stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "Scan worker ended abnormally");
                Err(SyncError::Internal(format!("scan worker failed: {}", e)))
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                    "Scan worker did not stop in time, detaching it"
                );
                Ok(())
            }
        }
    }
}

async fn run_worker(
    reconciler: Arc<Reconciler>,
    mut commands: mpsc::UnboundedReceiver<ScanCommand>,
    shutdown: CancellationToken,
    poll_interval: std::time::Duration,
) {
    debug!("Scan worker running");

    loop {
        match timeout(poll_interval, commands.recv()).await {
            Ok(Some(ScanCommand::Scan)) => {
                let mut folded = 0;
                while let Ok(ScanCommand::Scan) = commands.try_recv() {
                    folded += 1;
                }
                if folded > 0 {
                    debug!(folded, "Folded queued scan requests");
                }

                match reconciler.run_scan(&shutdown).await {
                    Ok(_) | Err(SyncError::Cancelled) => {}
                    Err(e) => error!(error = %e, "Scan failed"),
                }
            }
            Ok(None) => {
                debug!("Scan queue closed");
                break;
            }
            Err(_) => {}
        }

        if shutdown.is_cancelled() {
            break;
        }
    }

    debug!("Scan worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ScanState;
    use core_library::db::create_test_pool;
    use core_metadata::FilenameExtractor;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(root: &std::path::Path) -> CoreConfig {
        CoreConfig::builder()
            .database_path(":memory:")
            .watch_root(root)
            .enable_watcher(false)
            .scan_on_start(false)
            .queue_poll_interval(Duration::from_millis(20))
            .build()
            .unwrap()
    }

    async fn coordinator(config: CoreConfig) -> ScanCoordinator {
        let catalog = Catalog::sqlite(create_test_pool().await.unwrap());
        ScanCoordinator::new(config, catalog, Arc::new(FilenameExtractor::new()))
    }

    #[tokio::test]
    async fn test_requested_scan_completes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Saga 001.cbz"), b"x").unwrap();
        let coordinator = coordinator(test_config(dir.path())).await;

        coordinator.start().await.unwrap();
        coordinator.request_scan().unwrap();

        let status = timeout(
            Duration::from_secs(5),
            coordinator.status().wait_for(|s| s.last_complete.is_some()),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(status.state, ScanState::Idle);
        assert_eq!(status.added, 1);

        coordinator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_scan_on_start() {
        let dir = TempDir::new().unwrap();
        let config = CoreConfig {
            scan_on_start: true,
            ..test_config(dir.path())
        };
        let coordinator = coordinator(config).await;

        coordinator.start().await.unwrap();
        let status = timeout(
            Duration::from_secs(5),
            coordinator.status().wait_for(|s| s.last_complete.is_some()),
        )
        .await
        .unwrap();
        assert!(status.is_some());

        coordinator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(test_config(dir.path())).await;

        coordinator.start().await.unwrap();
        assert!(matches!(
            coordinator.start().await,
            Err(SyncError::Internal(_))
        ));
        coordinator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_requests_rejected_after_stop() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(test_config(dir.path())).await;

        coordinator.start().await.unwrap();
        coordinator.stop().await.unwrap();

        assert!(coordinator.is_stopped());
        assert!(matches!(coordinator.request_scan(), Err(SyncError::QueueClosed)));
        assert!(matches!(coordinator.start().await, Err(SyncError::QueueClosed)));
        // Stopping again is harmless.
        coordinator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(test_config(dir.path())).await;
        coordinator.stop().await.unwrap();
        assert_eq!(coordinator.status().snapshot().state, ScanState::Idle);
    }
}
