use core_library::models::EntityKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] core_metadata::MetadataError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Scan command queue is closed")]
    QueueClosed,

    #[error("Scan cancelled")]
    Cancelled,

    #[error("No {kind} named '{name}' in the entity dictionary")]
    MissingEntity { kind: EntityKind, name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
