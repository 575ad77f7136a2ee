// caliper_core/src/error.rs

use thiserror::Error;

use crate::linalg::MatrixError;
use crate::measurement::point::MeasurementPoint;

/// Every failure the measurement core can report.
///
/// All variants are recoverable by the caller: nothing in this crate aborts
/// the process, and nothing retries on its own.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasurementError {
    #[error("the engine is not calibrated; calibrate before measuring")]
    NotCalibrated,

    #[error("calibration size {distance} m is out of range [{min} m, {max} m]")]
    InvalidCalibrationDistance { distance: f64, min: f64, max: f64 },

    #[error("invalid measurement point ({}, {}): {reason}", point.x, point.y)]
    InvalidPoint {
        point: Box<MeasurementPoint>,
        reason: String,
    },

    #[error("expected {expected} points, got {actual}")]
    InsufficientPoints { expected: usize, actual: usize },

    #[error("value {value} is out of range [{min}, {max}]")]
    MeasurementOutOfRange { value: f64, min: f64, max: f64 },

    #[error("numerical processing failed: {0}")]
    Processing(String),

    #[error("dimension mismatch in {context}: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        context: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("unsupported unit '{unit}'")]
    UnsupportedUnit { unit: String },

    #[error("cannot convert '{from}' to '{to}': different unit families")]
    IncompatibleUnits { from: String, to: String },

    #[error("invalid camera parameters: {0}")]
    InvalidCameraParameters(String),

    #[error("invalid sensor sample: {0}")]
    InvalidSample(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<MatrixError> for MeasurementError {
    fn from(err: MatrixError) -> Self {
        match err {
            MatrixError::DimensionMismatch {
                op,
                expected,
                actual,
            } => MeasurementError::DimensionMismatch {
                context: op,
                expected,
                actual,
            },
            other => MeasurementError::Processing(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, MeasurementError>;
