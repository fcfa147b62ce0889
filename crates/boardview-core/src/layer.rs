use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BoardError;

/// Minimum separation kept between copper and the substrate surface it
/// nominally sits on, in board length units.
pub const DEFAULT_CLEARANCE: f64 = 0.01;

/// Slack allowed when re-checking the clearance invariant, so that rounding
/// in `t/2 + c - t/2` does not trip it.
const CLEARANCE_EPSILON: f64 = 1e-9;

/// A copper side of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Top,
    Bottom,
}

impl Layer {
    pub const ALL: [Layer; 2] = [Layer::Top, Layer::Bottom];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Top => "top",
            Layer::Bottom => "bottom",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layer {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top" => Ok(Layer::Top),
            "bottom" => Ok(Layer::Bottom),
            other => Err(BoardError::UnknownLayer(other.to_string())),
        }
    }
}

/// Elevation of the top copper plane for a substrate of `thickness`.
pub fn top_elevation(thickness: f64, clearance: f64) -> f64 {
    thickness / 2.0 + clearance
}

/// Elevation of the bottom copper plane for a substrate of `thickness`.
pub fn bottom_elevation(thickness: f64, clearance: f64) -> f64 {
    -thickness / 2.0 - clearance
}

/// Copper plane elevations derived from one substrate thickness.
///
/// The board normal is +y and the substrate is centred on y = 0. These values
/// are never cached by entities: every placement re-queries the current
/// offsets, so a thickness change is picked up by recomputing transforms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerOffsets {
    pub thickness: f64,
    pub clearance: f64,
    pub top: f64,
    pub bottom: f64,
}

impl LayerOffsets {
    pub fn elevation(&self, layer: Layer) -> f64 {
        match layer {
            Layer::Top => self.top,
            Layer::Bottom => self.bottom,
        }
    }

    /// Drill depth: the full substrate plus the clearance on both sides, so a
    /// hole always pierces both copper planes.
    pub fn hole_depth(&self) -> f64 {
        self.thickness + 2.0 * self.clearance
    }
}

/// Computes [`LayerOffsets`] for a fixed clearance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerOffsetCalculator {
    clearance: f64,
}

impl LayerOffsetCalculator {
    pub fn new(clearance: f64) -> Result<Self, BoardError> {
        if !clearance.is_finite() || clearance <= 0.0 {
            return Err(BoardError::InvalidClearance(clearance));
        }
        Ok(Self { clearance })
    }

    pub fn clearance(&self) -> f64 {
        self.clearance
    }

    pub fn offsets(&self, thickness: f64) -> Result<LayerOffsets, BoardError> {
        if !thickness.is_finite() || thickness <= 0.0 {
            return Err(BoardError::InvalidThickness(thickness));
        }
        let top = top_elevation(thickness, self.clearance);
        let bottom = bottom_elevation(thickness, self.clearance);

        if (top - thickness / 2.0).abs() < self.clearance - CLEARANCE_EPSILON {
            return Err(BoardError::ClearanceViolated {
                thickness,
                clearance: self.clearance,
                top,
            });
        }

        Ok(LayerOffsets {
            thickness,
            clearance: self.clearance,
            top,
            bottom,
        })
    }
}

impl Default for LayerOffsetCalculator {
    fn default() -> Self {
        Self {
            clearance: DEFAULT_CLEARANCE,
        }
    }
}
