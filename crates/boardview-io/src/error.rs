use std::io;

use thiserror::Error;

use boardview_core::BoardError;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid document at {path}: {reason}")]
    Invalid { path: String, reason: String },

    #[error("Unsupported document version {found}, newest understood is {supported}")]
    UnsupportedVersion { found: u64, supported: u32 },

    #[error("Board rejected the document: {0}")]
    Board(#[from] BoardError),
}

impl SnapshotError {
    pub(crate) fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SnapshotError::Invalid {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
