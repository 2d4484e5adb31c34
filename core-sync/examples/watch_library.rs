//! Watch one or more comic folders and keep a catalog up to date.
//!
//! ```text
//! cargo run -p core-sync --example watch_library -- catalog.db ~/Comics [more roots...]
//! ```
//!
//! Press Ctrl-C to stop.

use anyhow::{bail, Context};
use core_metadata::FilenameExtractor;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_runtime::CoreConfig;
use core_sync::{ScanCoordinator, ScanState};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default().with_format(LogFormat::Compact))?;

    let mut args = std::env::args().skip(1);
    let Some(database) = args.next() else {
        bail!("usage: watch_library <catalog.db> <root> [root...]");
    };
    let roots: Vec<String> = args.collect();
    if roots.is_empty() {
        bail!("at least one library root is required");
    }

    let config = CoreConfig::builder()
        .database_path(database)
        .watch_roots(roots)
        .debounce_delay(Duration::from_secs(5))
        .build()?;

    let coordinator = ScanCoordinator::open(config, Arc::new(FilenameExtractor::new()))
        .await
        .context("failed to open catalog")?;
    coordinator.start().await?;

    let status = coordinator.status();
    let reporter = tokio::spawn(async move {
        loop {
            let Some(started) = status.wait_for(|s| s.state == ScanState::Scanning).await else {
                break;
            };
            println!("scan started: {}", started.detail);

            let Some(done) = status.wait_for(|s| s.state == ScanState::Idle).await else {
                break;
            };
            println!(
                "scan finished: {} removed, {} scanned, {} added",
                done.removed, done.scanned, done.added
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    coordinator.stop().await?;
    reporter.abort();

    Ok(())
}
