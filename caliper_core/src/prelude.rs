// caliper_core/src/prelude.rs

// --- Errors & Configuration ---
pub use crate::config::{EngineConfig, FusionConfig};
pub use crate::error::{MeasurementError, Result};

// --- Core Data Structures ---
pub use crate::measurement::point::MeasurementPoint;
pub use crate::measurement::reference::{BoundingBox, DetectedObject};
pub use crate::measurement::result::{MeasurementKind, MeasurementMethod, MeasurementResult};
pub use crate::types::{CameraPoint, Pixel};

// --- Engines & Filters ---
pub use crate::estimation::fusion::{
    SensorAccuracy, SensorFusion, SensorKind, SensorSample, SensorSnapshot,
};
pub use crate::estimation::kalman::KalmanFilter;
pub use crate::measurement::engine::{Calibration, CalibrationSource, MeasurementEngine};
pub use crate::models::camera::{CameraModel, CameraParameters, Distortion};

// --- Transition Models ---
pub use crate::models::dynamics::generic::{
    ConstantAccelerationModel, ConstantVelocityModel, StaticModel,
};
pub use crate::models::dynamics::TransitionModel;
