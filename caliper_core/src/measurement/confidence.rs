// caliper_core/src/measurement/confidence.rs

//! The confidence model shared by every measurement.
//!
//! Starting from 1.0 the score is multiplied by:
//! 1. the mean confidence of the contributing points,
//! 2. a tilt penalty growing linearly to `max_tilt_penalty` at
//!    `tilt_saturation_deg` and flat beyond,
//! 3. `uncalibrated_penalty` when no calibration is in effect,
//! 4. `agreement_bonus` when an independent method agrees within tolerance,
//!
//! and finally clamped to `[min_confidence, 1.0]`.

use crate::config::EngineConfig;
use crate::types::mean;

#[derive(Debug, Clone, Default)]
pub struct ConfidenceInputs {
    pub point_confidences: Vec<f64>,
    /// Device tilt in degrees, if the sensors report one.
    pub tilt_degrees: Option<f64>,
    pub calibrated: bool,
    /// `(primary, secondary)` values from two methods, when both exist.
    pub secondary: Option<(f64, f64)>,
}

/// Multiplier in `[1 - max_tilt_penalty, 1]` for a given tilt.
pub fn tilt_factor(config: &EngineConfig, tilt_degrees: f64) -> f64 {
    if !tilt_degrees.is_finite() || config.tilt_saturation_deg <= 0.0 {
        return 1.0 - config.max_tilt_penalty;
    }
    let ratio = (tilt_degrees.abs() / config.tilt_saturation_deg).min(1.0);
    1.0 - config.max_tilt_penalty * ratio
}

/// True when two estimates differ by at most `agreement_tolerance`, relative
/// to the larger magnitude.
pub fn methods_agree(config: &EngineConfig, primary: f64, secondary: f64) -> bool {
    let scale = primary.abs().max(secondary.abs());
    if scale == 0.0 {
        return true;
    }
    (primary - secondary).abs() / scale <= config.agreement_tolerance
}

pub fn score(config: &EngineConfig, inputs: &ConfidenceInputs) -> f64 {
    let mut confidence = 1.0;

    confidence *= mean(inputs.point_confidences.iter().copied()).unwrap_or(1.0);

    if let Some(tilt) = inputs.tilt_degrees {
        confidence *= tilt_factor(config, tilt);
    }

    if !inputs.calibrated {
        confidence *= config.uncalibrated_penalty;
    }

    if let Some((primary, secondary)) = inputs.secondary {
        if methods_agree(config, primary, secondary) {
            confidence *= config.agreement_bonus;
        }
    }

    if confidence.is_nan() {
        return config.min_confidence;
    }
    confidence.clamp(config.min_confidence, 1.0)
}
