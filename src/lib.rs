//! Workspace facade crate.
//!
//! Host applications can depend on `comic-sync-workspace` and get the scan
//! engine and the bundled extractor through one dependency. Each workspace
//! crate can also be used on its own.

#[cfg(feature = "sync")]
pub use core_metadata;
#[cfg(feature = "sync")]
pub use core_sync;
