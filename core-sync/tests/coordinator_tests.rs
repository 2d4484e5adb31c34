//! End-to-end tests for the scan coordinator: file catalog on disk, live
//! filesystem watching and shutdown.

use core_library::db::{create_pool, DatabaseConfig};
use core_library::Catalog;
use core_metadata::FilenameExtractor;
use core_runtime::CoreConfig;
use core_sync::{ScanCoordinator, ScanState};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

fn config(library: &TempDir, data: &TempDir) -> CoreConfig {
    CoreConfig::builder()
        .database_path(data.path().join("catalog.db"))
        .watch_root(library.path())
        .debounce_delay(Duration::from_millis(200))
        .queue_poll_interval(Duration::from_millis(50))
        .shutdown_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_initial_scan_indexes_existing_files() {
    let library = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    std::fs::write(library.path().join("Saga 001.cbz"), b"1").unwrap();
    std::fs::write(library.path().join("readme.txt"), b"hi").unwrap();

    let coordinator = ScanCoordinator::open(config(&library, &data), Arc::new(FilenameExtractor::new()))
        .await
        .unwrap();
    coordinator.start().await.unwrap();

    let status = timeout(
        WAIT,
        coordinator.status().wait_for(|s| s.last_complete.is_some()),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(status.state, ScanState::Idle);
    assert_eq!(status.added, 1);
    assert_eq!(status.scanned, 2);

    coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_new_file_is_picked_up_by_watcher() {
    let library = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let config = config(&library, &data);

    let pool = create_pool(DatabaseConfig::new(&config.database_path)).await.unwrap();
    let catalog = Catalog::sqlite(pool);
    let coordinator = ScanCoordinator::new(config, catalog.clone(), Arc::new(FilenameExtractor::new()));
    coordinator.start().await.unwrap();

    let status = coordinator.status();
    timeout(WAIT, status.wait_for(|s| s.last_complete.is_some()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(catalog.comics.count().await.unwrap(), 0);

    std::fs::create_dir(library.path().join("new")).unwrap();
    std::fs::write(library.path().join("new/Hellboy 001.cbz"), b"1").unwrap();

    timeout(
        WAIT,
        status.wait_for(|s| s.state == ScanState::Idle && s.added == 1),
    )
    .await
    .unwrap()
    .unwrap();

    coordinator.stop().await.unwrap();
    assert_eq!(catalog.comics.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_catalog_survives_restart() {
    let library = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    std::fs::write(library.path().join("Saga 001.cbz"), b"1").unwrap();

    let first = ScanCoordinator::open(config(&library, &data), Arc::new(FilenameExtractor::new()))
        .await
        .unwrap();
    first.start().await.unwrap();
    timeout(WAIT, first.status().wait_for(|s| s.last_complete.is_some()))
        .await
        .unwrap()
        .unwrap();
    first.stop().await.unwrap();

    let second = ScanCoordinator::open(config(&library, &data), Arc::new(FilenameExtractor::new()))
        .await
        .unwrap();
    second.start().await.unwrap();
    let status = timeout(WAIT, second.status().wait_for(|s| s.last_complete.is_some()))
        .await
        .unwrap()
        .unwrap();
    second.stop().await.unwrap();

    assert_eq!(status.added, 0);
    assert_eq!(status.removed, 0);
}
