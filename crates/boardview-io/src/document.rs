use serde::{Deserialize, Serialize};

use boardview_core::Layer;

/// Newest document version this crate reads. Documents without a `version`
/// field are treated as version 1.
pub const DOCUMENT_VERSION: u32 = 1;

/// The persisted board description exchanged with the file codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub board: BoardSpec,
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardSpec {
    pub width: f64,
    pub height: f64,
    pub thickness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Component {
    #[serde(rename = "smd_rect")]
    SmdRect(SmdComponent),
    #[serde(rename = "smd_circle")]
    SmdCircle(SmdComponent),
    #[serde(rename = "path")]
    Path(PathComponent),
    #[serde(rename = "drill")]
    Drill(DrillComponent),
}

impl Component {
    pub fn id(&self) -> &str {
        match self {
            Component::SmdRect(c) | Component::SmdCircle(c) => &c.id,
            Component::Path(c) => &c.id,
            Component::Drill(c) => &c.id,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Component::SmdRect(_) => "smd_rect",
            Component::SmdCircle(_) => "smd_circle",
            Component::Path(_) => "path",
            Component::Drill(_) => "drill",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmdComponent {
    pub id: String,
    pub pos: [f64; 3],
    pub size: [f64; 2],
    pub layer: Layer,
    #[serde(default)]
    pub rotation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathComponent {
    pub id: String,
    pub pos: [f64; 3],
    /// Waypoints as `[x, z]` pairs on the board plane.
    pub points: Vec<[f64; 2]>,
    pub width: f64,
    pub layer: Layer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrillComponent {
    pub id: String,
    pub pos: [f64; 3],
    pub diameter: f64,
}

impl BoardDocument {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
