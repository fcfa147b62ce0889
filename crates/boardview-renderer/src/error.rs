use std::io;

use thiserror::Error;

use boardview_core::BoardError;
use boardview_io::SnapshotError;

use crate::backend::ResourceHandle;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Surface configuration rejected: {0}")]
    Surface(String),

    #[error("Resource allocation failed: {0}")]
    Allocation(String),

    #[error("Unknown or already released resource {0:?}")]
    UnknownResource(ResourceHandle),

    #[error("Write of {len} bytes at offset {offset} overruns buffer of {size} bytes")]
    BufferOverrun { offset: u64, len: usize, size: usize },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Rendering surface could not be created (full: {full}; reduced: {reduced})")]
    Initialization {
        full: BackendError,
        reduced: BackendError,
    },

    #[error("Graphics backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Board error: {0}")]
    Board(#[from] BoardError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Engine has been disposed")]
    Disposed,
}
