use std::fs;
use std::path::Path;

use crate::document::BoardDocument;
use crate::error::SnapshotError;
use crate::validate::parse_document;

/// Read and validate a board document from disk.
pub fn read_document(path: impl AsRef<Path>) -> Result<BoardDocument, SnapshotError> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)?;
    let doc = parse_document(&json)?;
    log::info!(
        "Read board document {} ({} components)",
        path.display(),
        doc.components.len()
    );
    Ok(doc)
}

/// Write a board document to disk as pretty-printed JSON.
pub fn write_document(path: impl AsRef<Path>, doc: &BoardDocument) -> Result<(), SnapshotError> {
    let path = path.as_ref();
    fs::write(path, doc.to_json()?)?;
    log::info!("Wrote board document {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{BoardSpec, Component, DrillComponent};

    #[test]
    fn test_write_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.json");
        let doc = BoardDocument {
            version: None,
            board: BoardSpec {
                width: 30.0,
                height: 20.0,
                thickness: 1.6,
            },
            components: vec![Component::Drill(DrillComponent {
                id: "d1".into(),
                pos: [1.0, 0.0, 1.0],
                diameter: 0.6,
            })],
        };
        write_document(&path, &doc).unwrap();
        assert_eq!(read_document(&path).unwrap(), doc);
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_document(dir.path().join("nope.json")),
            Err(SnapshotError::Io(_))
        ));
    }

    #[test]
    fn test_read_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(read_document(&path), Err(SnapshotError::Json(_))));
    }
}
