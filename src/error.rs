//! Error types for mixq

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Unsupported activation function `{0}` (expected a relu, hswish or swish variant)")]
    UnsupportedActivation(String),

    #[error("Calibration failed: no offset multiple of {unit} lies within bound of target {target}")]
    CalibrationFailed { target: f32, unit: f32 },

    #[error("Calibration in `first` mode requires a sample input")]
    MissingSampleInput,

    #[error("Operator `{0}` has no shape metadata; run calibration first")]
    MissingShapeMetadata(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, Error>;
