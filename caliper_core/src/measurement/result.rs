// caliper_core/src/measurement/result.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MeasurementError, Result};
use crate::measurement::point::MeasurementPoint;
use crate::measurement::units::{self, UnitFamily};

/// What a result measures. Each kind fixes how many points it is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeasurementKind {
    Distance,
    Area,
    Volume,
    Angle,
}

impl MeasurementKind {
    pub fn family(self) -> UnitFamily {
        match self {
            MeasurementKind::Distance => UnitFamily::Length,
            MeasurementKind::Area => UnitFamily::Area,
            MeasurementKind::Volume => UnitFamily::Volume,
            MeasurementKind::Angle => UnitFamily::Angle,
        }
    }

    /// Distance takes exactly 2 points, angle exactly 3 (vertex in the
    /// middle), area at least 3 and volume none.
    pub fn check_point_count(self, actual: usize) -> Result<()> {
        let (expected, ok) = match self {
            MeasurementKind::Distance => (2, actual == 2),
            MeasurementKind::Angle => (3, actual == 3),
            MeasurementKind::Area => (3, actual >= 3),
            MeasurementKind::Volume => (0, actual == 0),
        };
        if ok {
            Ok(())
        } else {
            Err(MeasurementError::InsufficientPoints { expected, actual })
        }
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MeasurementKind::Distance => "distance",
            MeasurementKind::Area => "area",
            MeasurementKind::Volume => "volume",
            MeasurementKind::Angle => "angle",
        };
        f.pad(name)
    }
}

/// How a value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementMethod {
    /// Pixel geometry scaled by a reference-object calibration factor.
    Calibrated2d,
    /// Metric 3D points, no calibration factor involved.
    Depth3d,
    /// Pixels back-projected onto a plane at a known distance.
    PlaneProjection,
    /// Pixel geometry scaled by a factor derived from the camera intrinsics.
    FocalLength,
    /// Scalar dimensions entered directly.
    Dimensions,
    /// Scale-free geometry (angles).
    Geometric,
}

impl MeasurementMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            MeasurementMethod::Calibrated2d => "calibrated_2d",
            MeasurementMethod::Depth3d => "depth_3d",
            MeasurementMethod::PlaneProjection => "plane_projection",
            MeasurementMethod::FocalLength => "focal_length",
            MeasurementMethod::Dimensions => "dimensions",
            MeasurementMethod::Geometric => "geometric",
        }
    }
}

impl fmt::Display for MeasurementMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A finished measurement, handed to persistence and display.
///
/// Immutable once built; [`MeasurementResult::convert_to`] returns a new
/// result rather than changing this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResult")]
pub struct MeasurementResult {
    kind: MeasurementKind,
    value: f64,
    unit: String,
    confidence: f64,
    points: Vec<MeasurementPoint>,
    method: MeasurementMethod,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawResult {
    kind: MeasurementKind,
    value: f64,
    unit: String,
    confidence: f64,
    #[serde(default)]
    points: Vec<MeasurementPoint>,
    method: MeasurementMethod,
    timestamp: DateTime<Utc>,
}

impl TryFrom<RawResult> for MeasurementResult {
    type Error = MeasurementError;

    fn try_from(raw: RawResult) -> Result<Self> {
        let mut result = Self::new(
            raw.kind,
            raw.value,
            raw.unit,
            raw.confidence,
            raw.points,
            raw.method,
        )?;
        result.timestamp = raw.timestamp;
        Ok(result)
    }
}

impl MeasurementResult {
    pub fn new(
        kind: MeasurementKind,
        value: f64,
        unit: impl Into<String>,
        confidence: f64,
        points: Vec<MeasurementPoint>,
        method: MeasurementMethod,
    ) -> Result<Self> {
        kind.check_point_count(points.len())?;
        if !value.is_finite() {
            return Err(MeasurementError::MeasurementOutOfRange {
                value,
                min: f64::MIN,
                max: f64::MAX,
            });
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(MeasurementError::MeasurementOutOfRange {
                value: confidence,
                min: 0.0,
                max: 1.0,
            });
        }

        Ok(Self {
            kind,
            value,
            unit: unit.into(),
            confidence,
            points,
            method,
            timestamp: Utc::now(),
        })
    }

    pub fn kind(&self) -> MeasurementKind {
        self.kind
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn points(&self) -> &[MeasurementPoint] {
        &self.points
    }

    pub fn method(&self) -> MeasurementMethod {
        self.method
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// `value` with a fixed number of decimals, followed by the unit.
    pub fn format_value(&self, digits: usize) -> String {
        format!("{:.*} {}", digits, self.value, self.unit)
    }

    pub fn formatted_date(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// The value expressed in the family's standard unit (m, m², m³, deg).
    pub fn standard_value(&self) -> Result<f64> {
        let family = self.kind.family();
        units::convert_in(family, self.value, &self.unit, units::standard_unit(family))
    }

    /// The same measurement expressed in another unit of its family.
    pub fn convert_to(&self, unit: &str) -> Result<Self> {
        let value = units::convert_in(self.kind.family(), self.value, &self.unit, unit)?;
        Ok(Self {
            value,
            unit: unit.to_owned(),
            ..self.clone()
        })
    }
}

impl fmt::Display for MeasurementResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({:.0}% confidence, {})",
            self.kind,
            units::format_number(self.value, &self.unit),
            self.confidence * 100.0,
            self.method
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pixels(n: usize) -> Vec<MeasurementPoint> {
        (0..n)
            .map(|i| MeasurementPoint::from_pixel(i as f64, 0.0).unwrap())
            .collect()
    }

    fn distance(value: f64, unit: &str) -> MeasurementResult {
        MeasurementResult::new(
            MeasurementKind::Distance,
            value,
            unit,
            0.9,
            pixels(2),
            MeasurementMethod::Calibrated2d,
        )
        .unwrap()
    }

    #[test]
    fn point_counts_are_enforced() {
        use MeasurementKind::*;
        assert!(Distance.check_point_count(2).is_ok());
        assert_eq!(
            Distance.check_point_count(1),
            Err(MeasurementError::InsufficientPoints { expected: 2, actual: 1 })
        );
        assert!(Angle.check_point_count(4).is_err());
        assert!(Area.check_point_count(7).is_ok());
        assert!(Area.check_point_count(2).is_err());
        assert!(Volume.check_point_count(0).is_ok());
        assert!(Volume.check_point_count(1).is_err());

        assert!(MeasurementResult::new(
            Angle,
            90.0,
            "°",
            1.0,
            pixels(2),
            MeasurementMethod::Geometric
        )
        .is_err());
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        assert!(MeasurementResult::new(
            MeasurementKind::Volume,
            1.0,
            "m³",
            1.2,
            vec![],
            MeasurementMethod::Dimensions
        )
        .is_err());
    }

    #[test]
    fn formatting() {
        let r = distance(8.56, "cm");
        assert_eq!(r.format_value(1), "8.6 cm");
        assert_eq!(r.format_value(3), "8.560 cm");
        assert_eq!(r.formatted_date().len(), "2024-01-01 00:00:00".len());
        assert_eq!(r.to_string(), "distance 8.56 cm (90% confidence, calibrated_2d)");
    }

    #[test]
    fn conversion_returns_new_result() {
        let r = distance(8.56, "cm");
        let inches = r.convert_to("in").unwrap();
        assert_relative_eq!(inches.value(), 8.56 / 2.54, epsilon = 1e-12);
        assert_eq!(inches.unit(), "in");
        assert_eq!(r.unit(), "cm");
        assert_relative_eq!(r.standard_value().unwrap(), 0.0856, epsilon = 1e-12);

        assert!(r.convert_to("m²").is_err());
    }

    #[test]
    fn serde_round_trip_keeps_timestamp() {
        let r = distance(1.5, "m");
        let json = serde_json::to_string(&r).unwrap();
        let back: MeasurementResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
