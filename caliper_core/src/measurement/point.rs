// caliper_core/src/measurement/point.rs

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MeasurementError, Result};
use crate::estimation::fusion::SensorSnapshot;

/// A sampled image point, optionally carrying metric depth.
///
/// `x`/`y` are pixel coordinates for tapped points, or metric coordinates for
/// points supplied by an AR session. `z` is present only when depth is known.
/// Construction validates every field, so a `MeasurementPoint` is always
/// finite with a confidence in `[0, 1]`. Points are never mutated; the
/// `with_*` methods return validated copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPoint")]
pub struct MeasurementPoint {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub sensor: Option<SensorSnapshot>,
}

/// The unvalidated wire form; deserialization goes through [`MeasurementPoint::validate`].
#[derive(Deserialize)]
struct RawPoint {
    x: f64,
    y: f64,
    #[serde(default)]
    z: Option<f64>,
    #[serde(default = "full_confidence")]
    confidence: f64,
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
    #[serde(default)]
    sensor: Option<SensorSnapshot>,
}

fn full_confidence() -> f64 {
    1.0
}

impl TryFrom<RawPoint> for MeasurementPoint {
    type Error = MeasurementError;

    fn try_from(raw: RawPoint) -> Result<Self> {
        MeasurementPoint {
            x: raw.x,
            y: raw.y,
            z: raw.z,
            confidence: raw.confidence,
            timestamp: raw.timestamp,
            sensor: raw.sensor,
        }
        .validate()
    }
}

impl MeasurementPoint {
    pub fn new(x: f64, y: f64, z: Option<f64>, confidence: f64) -> Result<Self> {
        MeasurementPoint {
            x,
            y,
            z,
            confidence,
            timestamp: Utc::now(),
            sensor: None,
        }
        .validate()
    }

    /// A tapped pixel with full confidence and no depth.
    pub fn from_pixel(x: f64, y: f64) -> Result<Self> {
        Self::new(x, y, None, 1.0)
    }

    /// An already-triangulated metric point, e.g. from plane tracking.
    pub fn from_world(x: f64, y: f64, z: f64) -> Result<Self> {
        Self::new(x, y, Some(z), 1.0)
    }

    fn validate(self) -> Result<Self> {
        let reason = if !self.x.is_finite() || !self.y.is_finite() {
            Some("coordinates must be finite")
        } else if self.z.is_some_and(|z| !z.is_finite()) {
            Some("depth must be finite")
        } else if !(0.0..=1.0).contains(&self.confidence) {
            Some("confidence must be within [0, 1]")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(MeasurementError::InvalidPoint {
                point: Box::new(self),
                reason: reason.to_owned(),
            }),
            None => Ok(self),
        }
    }

    pub fn with_confidence(&self, confidence: f64) -> Result<Self> {
        Self {
            confidence,
            ..self.clone()
        }
        .validate()
    }

    pub fn with_depth(&self, z: f64) -> Result<Self> {
        Self {
            z: Some(z),
            ..self.clone()
        }
        .validate()
    }

    pub fn with_sensor(&self, snapshot: SensorSnapshot) -> Self {
        Self {
            sensor: Some(snapshot),
            ..self.clone()
        }
    }

    pub fn with_timestamp(&self, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }

    pub fn has_depth(&self) -> bool {
        self.z.is_some()
    }

    /// Planar distance, ignoring depth.
    pub fn distance_2d(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Euclidean distance in 3D, when both points carry depth.
    pub fn distance_3d(&self, other: &Self) -> Option<f64> {
        let (z1, z2) = (self.z?, other.z?);
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, z1 - z2);
        Some((dx * dx + dy * dy + dz * dz).sqrt())
    }

    /// Hashes the geometric content (coordinates, depth, confidence).
    ///
    /// Timestamps and sensor snapshots are excluded: two taps on the same
    /// spot describe the same measurement.
    pub fn hash_content<H: Hasher>(&self, state: &mut H) {
        self.x.to_bits().hash(state);
        self.y.to_bits().hash(state);
        self.z.map(f64::to_bits).hash(state);
        self.confidence.to_bits().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn content_hash(p: &MeasurementPoint) -> u64 {
        let mut h = DefaultHasher::new();
        p.hash_content(&mut h);
        h.finish()
    }

    #[test]
    fn rejects_non_finite_coordinates() {
        for (x, y) in [(f64::NAN, 0.0), (0.0, f64::INFINITY)] {
            let err = MeasurementPoint::from_pixel(x, y).unwrap_err();
            assert!(matches!(err, MeasurementError::InvalidPoint { .. }));
        }
        assert!(MeasurementPoint::from_world(0.0, 0.0, f64::NEG_INFINITY).is_err());
    }

    #[test]
    fn rejects_confidence_outside_unit_interval() {
        assert!(MeasurementPoint::new(1.0, 1.0, None, 1.5).is_err());
        assert!(MeasurementPoint::new(1.0, 1.0, None, -0.1).is_err());
        assert!(MeasurementPoint::new(1.0, 1.0, None, f64::NAN).is_err());
        assert!(MeasurementPoint::new(1.0, 1.0, None, 0.0).is_ok());
    }

    #[test]
    fn copies_are_validated() {
        let p = MeasurementPoint::from_pixel(3.0, 4.0).unwrap();
        assert!(p.with_confidence(2.0).is_err());
        let deep = p.with_depth(2.0).unwrap();
        assert!(deep.has_depth());
        assert!(!p.has_depth());
    }

    #[test]
    fn distances() {
        let a = MeasurementPoint::from_world(0.0, 0.0, 0.0).unwrap();
        let b = MeasurementPoint::from_world(1.0, 2.0, 2.0).unwrap();
        assert_eq!(a.distance_2d(&b), 5.0_f64.sqrt());
        assert_eq!(a.distance_3d(&b), Some(3.0));

        let flat = MeasurementPoint::from_pixel(1.0, 2.0).unwrap();
        assert_eq!(a.distance_3d(&flat), None);
    }

    #[test]
    fn content_hash_ignores_timestamp() {
        let a = MeasurementPoint::from_pixel(10.0, 20.0).unwrap();
        let b = a.with_timestamp(DateTime::<Utc>::UNIX_EPOCH);
        let c = a.with_confidence(0.5).unwrap();
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_ne!(content_hash(&a), content_hash(&c));
    }

    #[test]
    fn deserialization_validates() {
        let ok: MeasurementPoint = serde_json::from_str(r#"{"x": 1.0, "y": 2.0}"#).unwrap();
        assert_eq!(ok.confidence, 1.0);
        let bad_confidence = r#"{"x": 1.0, "y": 2.0, "confidence": 3.0}"#;
        assert!(serde_json::from_str::<MeasurementPoint>(bad_confidence).is_err());
    }
}
