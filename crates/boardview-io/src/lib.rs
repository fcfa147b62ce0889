//! # Boardview I/O
//!
//! The board document format and the snapshot boundary between a document
//! and the live stores: validation gate, export, import, and plain JSON file
//! helpers.

pub mod document;
pub mod error;
pub mod file;
pub mod snapshot;
pub mod validate;

pub use document::{BoardDocument, BoardSpec, Component, DOCUMENT_VERSION};
pub use error::SnapshotError;
pub use file::{read_document, write_document};
pub use snapshot::{export_board, import_board, ImportReport};
pub use validate::{parse_document, validate_document};
