// caliper_core/src/config.rs

//! Tunable constants for the engine and the sensor-fusion front-end.
//!
//! Both structs deserialize from the `[engine]` and `[fusion]` tables of a
//! session file; every field has a default, so an empty table is valid.

use serde::{Deserialize, Serialize};

use crate::error::{MeasurementError, Result};

/// Standard gravity in m/s^2.
pub const GRAVITY: f64 = 9.80665;

fn invalid(reason: String) -> Result<()> {
    Err(MeasurementError::InvalidConfig(reason))
}

/// Finite and within `[min, max]`.
fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        invalid(format!("{name} must be within [{min}, {max}], got {value}"))
    }
}

// =========================================================================
// == Measurement Engine ==
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Smallest reference object accepted for calibration, in meters.
    pub min_calibration_size: f64,
    /// Largest reference object accepted for calibration, in meters.
    pub max_calibration_size: f64,
    /// Number of results kept in the LRU cache.
    pub cache_capacity: usize,
    /// Floor of every confidence score; never 0.
    pub min_confidence: f64,
    /// Confidence assigned to volumes computed from explicit dimensions.
    pub volume_confidence: f64,
    /// Relative tolerance within which two methods are said to agree.
    pub agreement_tolerance: f64,
    /// Multiplier applied when a secondary method agrees.
    pub agreement_bonus: f64,
    /// Largest fractional reduction caused by device tilt.
    pub max_tilt_penalty: f64,
    /// Tilt, in degrees, at which the tilt penalty saturates.
    pub tilt_saturation_deg: f64,
    /// Multiplier applied while the engine is uncalibrated.
    pub uncalibrated_penalty: f64,
    /// Detector confidence required before a detection may calibrate the engine.
    pub detection_min_confidence: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // A credit card (85.6 mm) is the canonical reference object.
            min_calibration_size: 0.01,
            max_calibration_size: 10.0,
            cache_capacity: 100,
            min_confidence: 0.1,
            volume_confidence: 0.95,
            agreement_tolerance: 0.05,
            agreement_bonus: 1.1,
            max_tilt_penalty: 0.3,
            tilt_saturation_deg: 45.0,
            uncalibrated_penalty: 0.5,
            detection_min_confidence: 0.7,
        }
    }
}

impl EngineConfig {
    /// Rejects settings that would break the confidence bounds or the
    /// calibration range. Every confidence is clamped to
    /// `[min_confidence, 1]`, so that interval must be non-empty and exclude 0.
    pub fn validate(&self) -> Result<()> {
        let floor = self.min_confidence;
        if !(floor.is_finite() && floor > 0.0 && floor <= 1.0) {
            return invalid(format!("min_confidence must be within (0, 1], got {floor}"));
        }
        check_range("volume_confidence", self.volume_confidence, 0.0, 1.0)?;
        check_range("uncalibrated_penalty", self.uncalibrated_penalty, 0.0, 1.0)?;
        check_range("max_tilt_penalty", self.max_tilt_penalty, 0.0, 1.0)?;
        check_range("detection_min_confidence", self.detection_min_confidence, 0.0, 1.0)?;
        check_range("agreement_bonus", self.agreement_bonus, 1.0, f64::MAX)?;
        check_range("agreement_tolerance", self.agreement_tolerance, 0.0, f64::MAX)?;
        check_range("tilt_saturation_deg", self.tilt_saturation_deg, 0.0, 180.0)?;

        let (min, max) = (self.min_calibration_size, self.max_calibration_size);
        if !(min.is_finite() && max.is_finite() && min > 0.0 && min <= max) {
            return invalid(format!(
                "calibration size range [{min}, {max}] must be positive and ordered"
            ));
        }
        Ok(())
    }
}

// =========================================================================
// == Sensor Fusion ==
// =========================================================================

/// Noise levels for one 3-axis smoothing filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelNoise {
    /// Diagonal of `Q`.
    pub process_noise: f64,
    /// Diagonal of `R` for a sample of `High` accuracy.
    pub measurement_noise: f64,
}

impl ChannelNoise {
    fn validate(&self, sensor: &str) -> Result<()> {
        check_range(&format!("{sensor}.process_noise"), self.process_noise, 0.0, f64::MAX)?;
        check_range(
            &format!("{sensor}.measurement_noise"),
            self.measurement_noise,
            0.0,
            f64::MAX,
        )
    }
}

impl Default for ChannelNoise {
    fn default() -> Self {
        Self {
            process_noise: 0.01,
            measurement_noise: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FusionConfig {
    pub accelerometer: ChannelNoise,
    pub gyroscope: ChannelNoise,
    pub magnetometer: ChannelNoise,
    /// Maximum deviation from `GRAVITY` (m/s^2) and maximum angular rate
    /// (rad/s) for the device to count as stable.
    pub stability_threshold: f64,
    /// Readings older than this no longer count as current, in milliseconds.
    pub max_sample_age_ms: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            accelerometer: ChannelNoise::default(),
            gyroscope: ChannelNoise::default(),
            magnetometer: ChannelNoise {
                process_noise: 0.05,
                measurement_noise: 0.5,
            },
            stability_threshold: 0.1,
            max_sample_age_ms: 1000.0,
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<()> {
        self.accelerometer.validate("accelerometer")?;
        self.gyroscope.validate("gyroscope")?;
        self.magnetometer.validate("magnetometer")?;
        check_range("stability_threshold", self.stability_threshold, 0.0, f64::MAX)?;
        check_range("max_sample_age_ms", self.max_sample_age_ms, 0.0, f64::MAX)
    }

    /// `max_sample_age_ms` in nanoseconds.
    pub fn max_sample_age_nanos(&self) -> i64 {
        (self.max_sample_age_ms * 1e6).min(i64::MAX as f64) as i64
    }
}
