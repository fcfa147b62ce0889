//! The import validation gate.
//!
//! Documents are checked in two passes before any store is touched: a
//! structural pass over the raw JSON (so a wrong type produces an error that
//! names the offending field) and a semantic pass over the typed document
//! (finite, positive dimensions; unique ids). Any violation rejects the whole
//! document.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::document::{BoardDocument, Component, DOCUMENT_VERSION};
use crate::error::SnapshotError;

type Result<T> = std::result::Result<T, SnapshotError>;

/// Parse and fully validate a JSON board document.
pub fn parse_document(json: &str) -> Result<BoardDocument> {
    let value: Value = serde_json::from_str(json)?;
    validate_value(&value)?;
    let doc: BoardDocument = serde_json::from_value(value)?;
    validate_document(&doc)?;
    Ok(doc)
}

// ── Structural pass ──────────────────────────────────────────────────

pub fn validate_value(value: &Value) -> Result<()> {
    let root = value
        .as_object()
        .ok_or_else(|| SnapshotError::invalid("$", "document must be an object"))?;

    if let Some(version) = root.get("version") {
        let v = version
            .as_u64()
            .ok_or_else(|| SnapshotError::invalid("version", "must be a non-negative integer"))?;
        check_version(v)?;
    }

    let board = root
        .get("board")
        .and_then(Value::as_object)
        .ok_or_else(|| SnapshotError::invalid("board", "missing or not an object"))?;
    for key in ["width", "height", "thickness"] {
        require_number(board, key, "board")?;
    }

    let components = root
        .get("components")
        .and_then(Value::as_array)
        .ok_or_else(|| SnapshotError::invalid("components", "missing or not an array"))?;

    for (i, component) in components.iter().enumerate() {
        validate_component_value(component, &format!("components[{i}]"))?;
    }
    Ok(())
}

fn validate_component_value(value: &Value, path: &str) -> Result<()> {
    let obj = value
        .as_object()
        .ok_or_else(|| SnapshotError::invalid(path, "component must be an object"))?;

    require_string(obj, "id", path)?;
    let kind = require_string(obj, "type", path)?;
    require_number_array(obj, "pos", 3, path)?;

    match kind {
        "smd_rect" | "smd_circle" => {
            require_layer(obj, path)?;
            require_number_array(obj, "size", 2, path)?;
            if let Some(rotation) = obj.get("rotation") {
                if !rotation.is_number() {
                    return Err(SnapshotError::invalid(
                        format!("{path}.rotation"),
                        "must be a number",
                    ));
                }
            }
        }
        "path" => {
            require_layer(obj, path)?;
            require_number(obj, "width", path)?;
            let points = obj
                .get("points")
                .and_then(Value::as_array)
                .ok_or_else(|| SnapshotError::invalid(format!("{path}.points"), "must be an array"))?;
            if points.len() < 2 {
                return Err(SnapshotError::invalid(
                    format!("{path}.points"),
                    format!("needs at least 2 points, got {}", points.len()),
                ));
            }
            for (j, point) in points.iter().enumerate() {
                check_number_array(point, 2, &format!("{path}.points[{j}]"))?;
            }
        }
        "drill" => {
            require_number(obj, "diameter", path)?;
        }
        other => {
            return Err(SnapshotError::invalid(
                format!("{path}.type"),
                format!("unknown component type '{other}'"),
            ));
        }
    }
    Ok(())
}

fn require_string<'a>(obj: &'a Map<String, Value>, key: &str, path: &str) -> Result<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| SnapshotError::invalid(format!("{path}.{key}"), "must be a string"))
}

fn require_number(obj: &Map<String, Value>, key: &str, path: &str) -> Result<f64> {
    obj.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| SnapshotError::invalid(format!("{path}.{key}"), "must be a number"))
}

fn require_layer(obj: &Map<String, Value>, path: &str) -> Result<()> {
    match obj.get("layer").and_then(Value::as_str) {
        Some("top") | Some("bottom") => Ok(()),
        _ => Err(SnapshotError::invalid(
            format!("{path}.layer"),
            "must be \"top\" or \"bottom\"",
        )),
    }
}

fn require_number_array(obj: &Map<String, Value>, key: &str, len: usize, path: &str) -> Result<()> {
    let field = format!("{path}.{key}");
    let value = obj
        .get(key)
        .ok_or_else(|| SnapshotError::invalid(&field, "missing"))?;
    check_number_array(value, len, &field)
}

fn check_number_array(value: &Value, len: usize, path: &str) -> Result<()> {
    let items = value
        .as_array()
        .ok_or_else(|| SnapshotError::invalid(path, format!("must be an array of {len} numbers")))?;
    if items.len() != len || !items.iter().all(Value::is_number) {
        return Err(SnapshotError::invalid(
            path,
            format!("must be exactly {len} numbers"),
        ));
    }
    Ok(())
}

fn check_version(found: u64) -> Result<()> {
    if found == 0 || found > u64::from(DOCUMENT_VERSION) {
        return Err(SnapshotError::UnsupportedVersion {
            found,
            supported: DOCUMENT_VERSION,
        });
    }
    Ok(())
}

// ── Semantic pass ────────────────────────────────────────────────────

/// Checks a typed document. Run on every import, including documents built
/// in code rather than parsed from JSON.
pub fn validate_document(doc: &BoardDocument) -> Result<()> {
    if let Some(version) = doc.version {
        check_version(u64::from(version))?;
    }

    let board = &doc.board;
    positive("board.width", board.width)?;
    positive("board.height", board.height)?;
    positive("board.thickness", board.thickness)?;

    let mut pad_ids = HashSet::new();
    let mut trace_ids = HashSet::new();
    let mut hole_ids = HashSet::new();

    for (i, component) in doc.components.iter().enumerate() {
        let path = format!("components[{i}]");
        if component.id().is_empty() {
            return Err(SnapshotError::invalid(format!("{path}.id"), "must not be empty"));
        }

        let (seen, pos) = match component {
            Component::SmdRect(c) | Component::SmdCircle(c) => {
                positive(&format!("{path}.size[0]"), c.size[0])?;
                positive(&format!("{path}.size[1]"), c.size[1])?;
                finite(&format!("{path}.rotation"), c.rotation)?;
                (&mut pad_ids, c.pos)
            }
            Component::Path(c) => {
                positive(&format!("{path}.width"), c.width)?;
                if c.points.len() < 2 {
                    return Err(SnapshotError::invalid(
                        format!("{path}.points"),
                        "needs at least 2 points",
                    ));
                }
                for (j, p) in c.points.iter().enumerate() {
                    finite(&format!("{path}.points[{j}][0]"), p[0])?;
                    finite(&format!("{path}.points[{j}][1]"), p[1])?;
                }
                (&mut trace_ids, c.pos)
            }
            Component::Drill(c) => {
                positive(&format!("{path}.diameter"), c.diameter)?;
                (&mut hole_ids, c.pos)
            }
        };

        for (axis, v) in pos.iter().enumerate() {
            finite(&format!("{path}.pos[{axis}]"), *v)?;
        }

        if !seen.insert(component.id().to_string()) {
            return Err(SnapshotError::invalid(
                format!("{path}.id"),
                format!("duplicate {} id '{}'", component.type_name(), component.id()),
            ));
        }
    }
    Ok(())
}

fn finite(path: &str, v: f64) -> Result<()> {
    if !v.is_finite() {
        return Err(SnapshotError::invalid(path, "must be finite"));
    }
    Ok(())
}

fn positive(path: &str, v: f64) -> Result<()> {
    if !v.is_finite() || v <= 0.0 {
        return Err(SnapshotError::invalid(path, format!("must be positive, got {v}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_invalid(json: &str, expected_path: &str) {
        match parse_document(json) {
            Err(SnapshotError::Invalid { path, .. }) => assert_eq!(path, expected_path),
            other => panic!("expected Invalid at {expected_path}, got {other:?}"),
        }
    }

    const BOARD: &str = r#""board":{"width":50,"height":40,"thickness":1.6}"#;

    #[test]
    fn test_accepts_all_component_kinds() {
        let json = format!(
            r#"{{{BOARD},"components":[
                {{"id":"p1","type":"smd_rect","pos":[0,0,0],"size":[2,2],"layer":"top","rotation":0}},
                {{"id":"p2","type":"smd_circle","pos":[5,0,5],"size":[1,1],"layer":"bottom"}},
                {{"id":"t1","type":"path","pos":[0,0,0],"points":[[0,0],[10,0]],"width":0.5,"layer":"top"}},
                {{"id":"d1","type":"drill","pos":[3,0,3],"diameter":0.8}}
            ]}}"#
        );
        let doc = parse_document(&json).unwrap();
        assert_eq!(doc.components.len(), 4);
        assert_eq!(doc.components[1].type_name(), "smd_circle");
    }

    #[test]
    fn test_pos_must_have_three_numbers() {
        let json = format!(
            r#"{{{BOARD},"components":[{{"id":"d","type":"drill","pos":[1,2],"diameter":1}}]}}"#
        );
        expect_invalid(&json, "components[0].pos");
    }

    #[test]
    fn test_smd_requires_layer_and_size() {
        let json = format!(
            r#"{{{BOARD},"components":[{{"id":"p","type":"smd_rect","pos":[0,0,0],"size":[2,2],"layer":"inner"}}]}}"#
        );
        expect_invalid(&json, "components[0].layer");

        let json = format!(
            r#"{{{BOARD},"components":[{{"id":"p","type":"smd_rect","pos":[0,0,0],"size":[2],"layer":"top"}}]}}"#
        );
        expect_invalid(&json, "components[0].size");
    }

    #[test]
    fn test_path_requires_two_points() {
        let json = format!(
            r#"{{{BOARD},"components":[{{"id":"t","type":"path","pos":[0,0,0],"points":[[0,0]],"width":1,"layer":"top"}}]}}"#
        );
        expect_invalid(&json, "components[0].points");
    }

    #[test]
    fn test_drill_requires_numeric_diameter() {
        let json = format!(
            r#"{{{BOARD},"components":[{{"id":"d","type":"drill","pos":[0,0,0],"diameter":"big"}}]}}"#
        );
        expect_invalid(&json, "components[0].diameter");
    }

    #[test]
    fn test_id_and_type_must_be_strings() {
        let json = format!(
            r#"{{{BOARD},"components":[{{"id":7,"type":"drill","pos":[0,0,0],"diameter":1}}]}}"#
        );
        expect_invalid(&json, "components[0].id");

        let json = format!(
            r#"{{{BOARD},"components":[{{"id":"x","type":"via","pos":[0,0,0]}}]}}"#
        );
        expect_invalid(&json, "components[0].type");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = format!(
            r#"{{{BOARD},"components":[
                {{"id":"d","type":"drill","pos":[0,0,0],"diameter":1}},
                {{"id":"d","type":"drill","pos":[1,0,1],"diameter":1}}
            ]}}"#
        );
        expect_invalid(&json, "components[1].id");
    }

    #[test]
    fn test_same_id_allowed_across_kinds() {
        let json = format!(
            r#"{{{BOARD},"components":[
                {{"id":"x","type":"drill","pos":[0,0,0],"diameter":1}},
                {{"id":"x","type":"smd_rect","pos":[0,0,0],"size":[1,1],"layer":"top"}}
            ]}}"#
        );
        assert!(parse_document(&json).is_ok());
    }

    #[test]
    fn test_future_version_rejected() {
        let json = format!(r#"{{"version":99,{BOARD},"components":[]}}"#);
        assert!(matches!(
            parse_document(&json),
            Err(SnapshotError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_oversized_version_not_truncated() {
        // 2^32 + 1 must not wrap around to version 1.
        let json = format!(r#"{{"version":4294967297,{BOARD},"components":[]}}"#);
        assert!(matches!(
            parse_document(&json),
            Err(SnapshotError::UnsupportedVersion { found: 4_294_967_297, .. })
        ));
    }

    #[test]
    fn test_zero_thickness_rejected() {
        let json = r#"{"board":{"width":50,"height":40,"thickness":0},"components":[]}"#;
        expect_invalid(json, "board.thickness");
    }
}
