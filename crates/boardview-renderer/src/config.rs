use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use boardview_core::{BoardDimensions, BoardSettings};

use crate::appearance::AppearancePalette;
use crate::backend::SurfaceConfig;
use crate::error::EngineError;
use crate::picking::DEFAULT_HIT_TOLERANCE;

/// Everything needed to build a [`crate::engine::BoardEngine`]. Every field
/// has a default, so a config file only lists what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Clearance, copper thickness and per-store capacities.
    pub board: BoardSettings,
    /// Board outline used until a document is imported.
    pub dimensions: BoardDimensions,
    /// Band around thin geometry that still counts as a hit.
    pub hit_tolerance: f64,
    pub palette: AppearancePalette,
    /// Tried first.
    pub surface: SurfaceConfig,
    /// Tried once if `surface` is refused.
    pub fallback_surface: SurfaceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            board: BoardSettings::default(),
            dimensions: BoardDimensions::default(),
            hit_tolerance: DEFAULT_HIT_TOLERANCE,
            palette: AppearancePalette::default(),
            surface: SurfaceConfig::full(),
            fallback_surface: SurfaceConfig::reduced(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let config = Self::from_json(&fs::read_to_string(path)?)?;
        log::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }

    fn check(&self) -> Result<(), EngineError> {
        if !self.hit_tolerance.is_finite() || self.hit_tolerance < 0.0 {
            return Err(EngineError::Config(format!(
                "hit_tolerance must be a non-negative number, got {}",
                self.hit_tolerance
            )));
        }
        if !self.board.copper_thickness.is_finite() || self.board.copper_thickness <= 0.0 {
            return Err(EngineError::Config(format!(
                "copper_thickness must be positive, got {}",
                self.board.copper_thickness
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.board.capacities.pads, 10_000);
        assert_eq!(config.board.capacities.trace_segments, 20_000);
        assert_eq!(config.board.capacities.holes, 5_000);
        assert_eq!(config.board.clearance, 0.01);
        assert_eq!(config.hit_tolerance, 0.5);
        assert_eq!(config.surface.msaa_samples, 4);
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_json(
            r#"{ "hit_tolerance": 1.0, "board": { "capacities": { "pads": 12 } } }"#,
        )
        .unwrap();
        assert_eq!(config.hit_tolerance, 1.0);
        assert_eq!(config.board.capacities.pads, 12);
        assert_eq!(config.board.capacities.holes, 5_000);
        assert_eq!(config.board.copper_thickness, 0.035);
    }

    #[test]
    fn test_rejects_negative_tolerance() {
        assert!(matches!(
            EngineConfig::from_json(r#"{ "hit_tolerance": -1 }"#),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let mut config = EngineConfig::default();
        config.palette.trace = None;
        fs::write(&path, config.to_json().unwrap()).unwrap();
        assert_eq!(EngineConfig::from_json_file(&path).unwrap(), config);
    }
}
