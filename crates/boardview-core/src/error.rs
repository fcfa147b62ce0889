use thiserror::Error;

/// Errors raised by board construction and reconfiguration.
///
/// Steady-state authoring never produces these: capacity exhaustion and
/// unknown ids are reported through `bool`/`Option` results instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoardError {
    #[error("Substrate thickness must be positive and finite, got {0}")]
    InvalidThickness(f64),

    #[error("Layer clearance must be positive and finite, got {0}")]
    InvalidClearance(f64),

    #[error("Copper at {top} is closer than {clearance} to a substrate of thickness {thickness}")]
    ClearanceViolated {
        thickness: f64,
        clearance: f64,
        top: f64,
    },

    #[error("Board dimensions must be positive and finite, got {width} x {height}")]
    InvalidDimensions { width: f64, height: f64 },

    #[error("Unknown layer '{0}'")]
    UnknownLayer(String),
}
