//! Scan status surface
//!
//! The worker owns a [`StatusReporter`] and mutates it as a scan progresses.
//! Any number of pollers hold a [`StatusHandle`] and read snapshots without
//! ever waiting on the worker.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanState {
    Idle,
    Scanning,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanState::Idle => write!(f, "IDLE"),
            ScanState::Scanning => write!(f, "SCANNING"),
        }
    }
}

/// Point-in-time view of the scan pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStatus {
    pub state: ScanState,
    /// Human-readable progress line, empty when idle
    pub detail: String,
    /// Epoch milliseconds of the last scan that ran to completion
    pub last_complete: Option<i64>,
    pub scanned: u64,
    pub added: u64,
    pub removed: u64,
}

impl Default for ScanStatus {
    fn default() -> Self {
        Self {
            state: ScanState::Idle,
            detail: String::new(),
            last_complete: None,
            scanned: 0,
            added: 0,
            removed: 0,
        }
    }
}

/// Write side of the status surface. Held by the scan worker only.
#[derive(Debug)]
pub struct StatusReporter {
    tx: watch::Sender<ScanStatus>,
}

impl StatusReporter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ScanStatus::default());
        Self { tx }
    }

    pub fn handle(&self) -> StatusHandle {
        StatusHandle {
            rx: self.tx.subscribe(),
        }
    }

    pub fn snapshot(&self) -> ScanStatus {
        self.tx.borrow().clone()
    }

    /// Enter `SCANNING` and reset the per-scan counters.
    pub fn begin_scan(&self) {
        self.tx.send_modify(|status| {
            status.state = ScanState::Scanning;
            status.detail = "Starting scan".to_string();
            status.scanned = 0;
            status.added = 0;
            status.removed = 0;
        });
    }

    pub fn set_detail(&self, detail: impl Into<String>) {
        let detail = detail.into();
        self.tx.send_modify(|status| status.detail = detail);
    }

    pub fn record_removed(&self, count: u64) {
        self.tx.send_modify(|status| status.removed += count);
    }

    pub fn record_scanned(&self, path: &str) {
        self.tx.send_modify(|status| {
            status.scanned += 1;
            status.detail = format!("Scanned {}", path);
        });
    }

    pub fn record_added(&self) {
        self.tx.send_modify(|status| status.added += 1);
    }

    /// Take back `count` additions whose batch failed to commit.
    pub fn rollback_added(&self, count: u64) {
        self.tx
            .send_modify(|status| status.added = status.added.saturating_sub(count));
    }

    /// Return to `IDLE`. `completed_at` is `None` when the scan was cancelled.
    pub fn finish(&self, completed_at: Option<i64>) {
        self.tx.send_modify(|status| {
            status.state = ScanState::Idle;
            status.detail.clear();
            if completed_at.is_some() {
                status.last_complete = completed_at;
            }
        });
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only, cloneable view of the scan status.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    rx: watch::Receiver<ScanStatus>,
}

impl StatusHandle {
    pub fn snapshot(&self) -> ScanStatus {
        self.rx.borrow().clone()
    }

    /// Wait until the status satisfies `predicate`.
    ///
    /// Returns `None` if the reporter has been dropped before that happens.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Option<ScanStatus>
    where
        F: FnMut(&ScanStatus) -> bool,
    {
        let mut rx = self.rx.clone();
        let status = rx
            .wait_for(|status| predicate(status))
            .await
            .ok()
            .map(|status| status.clone());
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serializes_uppercase() {
        let status = ScanStatus::default();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "IDLE");

        let json = serde_json::to_string(&ScanState::Scanning).unwrap();
        assert_eq!(json, "\"SCANNING\"");
    }

    #[test]
    fn test_scan_lifecycle_updates_handle() {
        let reporter = StatusReporter::new();
        let handle = reporter.handle();

        reporter.begin_scan();
        reporter.record_removed(2);
        reporter.record_scanned("/comics/a.cbz");
        reporter.record_added();
        reporter.record_added();

        let status = handle.snapshot();
        assert_eq!(status.state, ScanState::Scanning);
        assert_eq!(status.scanned, 1);
        assert_eq!(status.added, 2);
        assert_eq!(status.removed, 2);
        assert!(status.detail.contains("a.cbz"));

        reporter.rollback_added(5);
        assert_eq!(handle.snapshot().added, 0);

        reporter.finish(Some(42));
        let status = handle.snapshot();
        assert_eq!(status.state, ScanState::Idle);
        assert!(status.detail.is_empty());
        assert_eq!(status.last_complete, Some(42));
    }

    #[test]
    fn test_cancelled_finish_keeps_previous_completion() {
        let reporter = StatusReporter::new();
        reporter.begin_scan();
        reporter.finish(None);
        assert_eq!(reporter.snapshot().last_complete, None);

        reporter.begin_scan();
        reporter.finish(Some(7));
        reporter.begin_scan();
        reporter.finish(None);
        assert_eq!(reporter.snapshot().last_complete, Some(7));
    }

    #[tokio::test]
    async fn test_wait_for_sees_later_update() {
        let reporter = StatusReporter::new();
        let handle = reporter.handle();

        let waiter = tokio::spawn(async move {
            handle
                .wait_for(|status| status.state == ScanState::Scanning)
                .await
        });

        reporter.begin_scan();
        let seen = waiter.await.unwrap().unwrap();
        assert_eq!(seen.state, ScanState::Scanning);
    }
}
