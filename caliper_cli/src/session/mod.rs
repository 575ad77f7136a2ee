// caliper_cli/src/session/mod.rs

//! Session files: what to feed the engine and what to ask it.
//!
//! A session is a TOML document with optional `[engine]`, `[fusion]`,
//! `[camera]` and `[calibration]` tables, a `[[samples]]` array of sensor
//! readings and a `[[measurements]]` array of requests. Environment variables
//! prefixed with `CALIPER_` override file values, with `__` separating nested
//! keys (`CALIPER_ENGINE__CACHE_CAPACITY=10`).

mod runner;

pub use runner::{run, Outcome, SessionReport};

use std::path::Path;

use anyhow::{Context, Result};
use caliper_core::prelude::*;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub engine: EngineConfig,
    pub fusion: FusionConfig,
    pub camera: Option<CameraConfig>,
    pub calibration: Option<CalibrationStep>,
    pub samples: Vec<SensorSample>,
    pub measurements: Vec<MeasurementRequest>,
}

/// Either full intrinsics or just a resolution (smartphone defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CameraConfig {
    Explicit(CameraParameters),
    Default {
        image_width: u32,
        image_height: u32,
        #[serde(default)]
        focal_length_px: Option<f64>,
    },
}

impl CameraConfig {
    pub fn build(&self) -> caliper_core::error::Result<CameraModel> {
        match self {
            CameraConfig::Explicit(params) => CameraModel::new(params.clone()),
            CameraConfig::Default {
                image_width,
                image_height,
                focal_length_px,
            } => CameraModel::create_default(*image_width, *image_height, *focal_length_px),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum CalibrationStep {
    ReferenceObject {
        known_size_m: f64,
        measured_pixels: f64,
    },
    Manual {
        known_distance_m: f64,
        pixel_distance: f64,
    },
    /// Needs a `[camera]` table.
    Camera { plane_distance_m: f64 },
    Detection { objects: Vec<DetectedObject> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementRequest {
    /// Shown next to the result; defaults to the request's position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Re-express the result in this unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert_to: Option<String>,
    #[serde(flatten)]
    pub kind: RequestKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestKind {
    Distance {
        points: Vec<MeasurementPoint>,
        #[serde(default)]
        use_3d: bool,
    },
    /// Needs a `[camera]` table.
    PlaneDistance {
        points: Vec<MeasurementPoint>,
        plane_distance_m: f64,
    },
    Area {
        points: Vec<MeasurementPoint>,
    },
    /// Points in order `[arm, vertex, arm]`.
    Angle {
        points: Vec<MeasurementPoint>,
    },
    Volume {
        length: f64,
        width: f64,
        height: f64,
    },
}

impl SessionConfig {
    /// Extracts a session from any figment; lets tests feed TOML strings.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        figment
            .extract()
            .context("invalid session configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("session file not found at {}", path.display());
        }
        log::info!("loading session from {}", path.display());
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Env::prefixed("CALIPER_").split("__")),
        )
        .with_context(|| format!("failed to load session {}", path.display()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize session")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const SESSION: &str = r#"
        [engine]
        cache_capacity = 8

        [camera]
        image_width = 640
        image_height = 480
        focal_length_px = 500.0

        [calibration]
        method = "reference_object"
        known_size_m = 0.0856
        measured_pixels = 200.0

        [[samples]]
        kind = "accelerometer"
        x = 0.0
        y = 0.0
        z = 9.80665
        accuracy = "high"
        timestamp_nanos = 0

        [[measurements]]
        label = "card width"
        type = "distance"
        points = [{ x = 0.0, y = 0.0 }, { x = 200.0, y = 0.0 }]

        [[measurements]]
        type = "area"
        convert_to = "cm²"
        points = [
            { x = 0.0, y = 0.0 },
            { x = 100.0, y = 0.0 },
            { x = 100.0, y = 100.0 },
            { x = 0.0, y = 100.0 },
        ]

        [[measurements]]
        type = "angle"
        points = [{ x = 1.0, y = 0.0 }, { x = 0.0, y = 0.0 }, { x = 0.0, y = 1.0 }]

        [[measurements]]
        type = "volume"
        length = 0.5
        width = 0.4
        height = 0.3
    "#;

    #[test]
    fn parses_a_full_session() {
        let session = SessionConfig::from_figment(Figment::from(Toml::string(SESSION))).unwrap();
        assert_eq!(session.engine.cache_capacity, 8);
        assert_eq!(session.engine.min_confidence, 0.1);
        assert!(matches!(
            session.camera,
            Some(CameraConfig::Default {
                focal_length_px: Some(_),
                ..
            })
        ));
        assert!(matches!(
            session.calibration,
            Some(CalibrationStep::ReferenceObject { .. })
        ));
        assert_eq!(session.samples.len(), 1);
        assert_eq!(session.measurements.len(), 4);
        assert_eq!(session.measurements[0].label.as_deref(), Some("card width"));
        assert!(matches!(
            session.measurements[3].kind,
            RequestKind::Volume { .. }
        ));
    }

    #[test]
    fn explicit_camera_parameters() {
        let toml = r#"
            [camera]
            image_width = 640
            image_height = 480
            focal_length = [500.0, 510.0]
            principal_point = [320.0, 240.0]
            distortion = [-0.2, 0.1, 0.0, 0.0, 0.0]
        "#;
        let session = SessionConfig::from_figment(Figment::from(Toml::string(toml))).unwrap();
        let camera = session.camera.unwrap().build().unwrap();
        assert_eq!(camera.parameters().focal_length, [500.0, 510.0]);
        assert!(!camera.is_estimated());
    }

    #[test]
    fn rejects_unknown_engine_keys() {
        let toml = "[engine]\ncache_size = 3\n";
        assert!(SessionConfig::from_figment(Figment::from(Toml::string(toml))).is_err());
    }

    #[test]
    fn empty_session_is_valid() {
        let session = SessionConfig::from_figment(Figment::from(Toml::string(""))).unwrap();
        assert!(session.measurements.is_empty());
        assert!(session.calibration.is_none());
    }
}
