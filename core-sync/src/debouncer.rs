//! Filesystem event debouncing
//!
//! Bursts of raw change notifications collapse into one [`ScanCommand::Scan`].
//! A single task owns the pending deadline; every signal pushes the deadline
//! back by the configured delay, and the command is queued once the tree has
//! been quiet for that long.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::coordinator::ScanCommand;

/// Cheap, cloneable sender of "something changed" signals.
///
/// Safe to call from the watcher's callback thread; it never blocks.
#[derive(Debug, Clone)]
pub struct DebounceHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl DebounceHandle {
    pub fn notify(&self) {
        if self.tx.send(()).is_err() {
            trace!("Debouncer is gone, dropping change signal");
        }
    }

    #[cfg(test)]
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// Owner of the debounce task.
#[derive(Debug)]
pub struct EventDebouncer {
    handle: DebounceHandle,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EventDebouncer {
    /// Spawn the debounce task. It queues onto `commands` and ends when
    /// `cancel` fires or the command queue closes.
    pub fn spawn(
        delay: Duration,
        commands: mpsc::UnboundedSender<ScanCommand>,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_debounce_loop(delay, rx, commands, cancel.clone()));

        Self {
            handle: DebounceHandle { tx },
            cancel,
            task,
        }
    }

    pub fn handle(&self) -> DebounceHandle {
        self.handle.clone()
    }

    /// Stop the task, discarding any pending deadline.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Debounce task ended abnormally");
        }
    }
}

async fn run_debounce_loop(
    delay: Duration,
    mut signals: mpsc::UnboundedReceiver<()>,
    commands: mpsc::UnboundedSender<ScanCommand>,
    cancel: CancellationToken,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        let expiry = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            signal = signals.recv() => match signal {
                Some(()) => {
                    deadline = Some(Instant::now() + delay);
                }
                None => break,
            },

            _ = expiry => {
                deadline = None;
                debug!(delay_ms = delay.as_millis() as u64, "Library quiet, queueing scan");
                if commands.send(ScanCommand::Scan).is_err() {
                    debug!("Scan queue closed, stopping debouncer");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    const DELAY: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn test_burst_yields_single_scan() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = EventDebouncer::spawn(DELAY, tx, CancellationToken::new());
        let handle = debouncer.handle();

        for _ in 0..5 {
            handle.notify();
            tokio::time::sleep(Duration::from_secs(10)).await;
        }

        // Still inside the quiet period of the last signal.
        assert!(rx.try_recv().is_err());

        let command = timeout(Duration::from_secs(60), rx.recv()).await.unwrap();
        assert_eq!(command, Some(ScanCommand::Scan));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(rx.try_recv().is_err());

        debouncer.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_yield_separate_scans() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = EventDebouncer::spawn(DELAY, tx, CancellationToken::new());
        let handle = debouncer.handle();

        handle.notify();
        tokio::time::sleep(Duration::from_secs(31)).await;
        handle.notify();
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(rx.try_recv().ok(), Some(ScanCommand::Scan));
        assert_eq!(rx.try_recv().ok(), Some(ScanCommand::Scan));
        assert!(rx.try_recv().is_err());

        debouncer.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_pending_deadline() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let debouncer = EventDebouncer::spawn(DELAY, tx, cancel.clone());

        debouncer.handle().notify();
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        debouncer.shutdown().await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_queue_ends_task() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let debouncer = EventDebouncer::spawn(DELAY, tx, CancellationToken::new());

        debouncer.handle().notify();
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert!(debouncer.task.is_finished());
    }
}
