// caliper_core/src/estimation/fusion.rs

//! Per-sensor smoothing and the tilt/orientation estimate derived from it.
//!
//! Each physical sensor (accelerometer, gyroscope, magnetometer) gets its own
//! 3-axis [`KalmanFilter`] with `F = I`, `H = I`. The filtered gravity vector
//! gives pitch, roll and the overall tilt fed into the measurement engine's
//! confidence model; the filtered magnetic field adds a tilt-compensated
//! heading when available.

use log::{trace, warn};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::config::{ChannelNoise, FusionConfig, GRAVITY};
use crate::error::{MeasurementError, Result};
use crate::estimation::kalman::KalmanFilter;
use crate::linalg::{self, column};
use crate::types::{all_finite, TimestampNanos};

// =========================================================================
// == Sensor Samples ==
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
    Magnetometer,
}

impl SensorKind {
    fn index(self) -> usize {
        match self {
            SensorKind::Accelerometer => 0,
            SensorKind::Gyroscope => 1,
            SensorKind::Magnetometer => 2,
        }
    }

    /// Share of this sensor in the overall accuracy score.
    fn accuracy_weight(self) -> f64 {
        match self {
            SensorKind::Accelerometer => 0.4,
            SensorKind::Gyroscope | SensorKind::Magnetometer => 0.3,
        }
    }
}

/// Accuracy status reported alongside a sample (0..=3 on Android).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorAccuracy {
    #[default]
    Unreliable,
    Low,
    Medium,
    High,
}

impl SensorAccuracy {
    pub fn from_status(status: i32) -> Self {
        match status {
            3 => SensorAccuracy::High,
            2 => SensorAccuracy::Medium,
            1 => SensorAccuracy::Low,
            _ => SensorAccuracy::Unreliable,
        }
    }

    pub fn score(self) -> f64 {
        match self {
            SensorAccuracy::High => 1.0,
            SensorAccuracy::Medium => 0.75,
            SensorAccuracy::Low => 0.5,
            SensorAccuracy::Unreliable => 0.25,
        }
    }
}

/// One raw vector sample from the sensor-polling collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub kind: SensorKind,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub accuracy: SensorAccuracy,
    pub timestamp_nanos: TimestampNanos,
}

impl SensorSample {
    pub fn new(kind: SensorKind, values: [f64; 3], timestamp_nanos: TimestampNanos) -> Self {
        Self {
            kind,
            x: values[0],
            y: values[1],
            z: values[2],
            accuracy: SensorAccuracy::High,
            timestamp_nanos,
        }
    }

    pub fn with_accuracy(mut self, accuracy: SensorAccuracy) -> Self {
        self.accuracy = accuracy;
        self
    }
}

/// Filtered sensor values at one instant, attached to measurement points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub accelerometer: Option<[f64; 3]>,
    pub gyroscope: Option<[f64; 3]>,
    pub magnetometer: Option<[f64; 3]>,
    pub timestamp_nanos: TimestampNanos,
}

/// Device attitude derived from the filtered sensors, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub pitch_deg: f64,
    pub roll_deg: f64,
    /// Magnetic heading in `[0, 360)`, if a magnetometer reading exists.
    pub heading_deg: Option<f64>,
}

// =========================================================================
// == Fusion Pipeline ==
// =========================================================================

#[derive(Debug, Clone)]
struct Channel {
    filter: KalmanFilter,
    last_timestamp: Option<TimestampNanos>,
    accuracy: SensorAccuracy,
}

impl Channel {
    fn new(noise: ChannelNoise) -> Result<Self> {
        Ok(Self {
            filter: KalmanFilter::smoother(3, noise.process_noise, noise.measurement_noise)?,
            last_timestamp: None,
            accuracy: SensorAccuracy::Unreliable,
        })
    }

    fn value(&self) -> Option<Vector3<f64>> {
        self.last_timestamp?;
        let x = self.filter.state();
        Some(Vector3::new(x[(0, 0)], x[(1, 0)], x[(2, 0)]))
    }
}

/// Smooths the three vector sensors and derives the device attitude.
///
/// Feed samples from a single producer thread through [`SensorFusion::ingest`].
#[derive(Debug, Clone)]
pub struct SensorFusion {
    config: FusionConfig,
    channels: [Channel; 3],
}

impl SensorFusion {
    /// Fails with [`MeasurementError::InvalidConfig`] when `config` does not validate.
    pub fn new(config: FusionConfig) -> Result<Self> {
        config.validate()?;
        let channels = [
            Channel::new(config.accelerometer)?,
            Channel::new(config.gyroscope)?,
            Channel::new(config.magnetometer)?,
        ];
        Ok(Self { config, channels })
    }

    /// Filters one sample and returns the updated estimate for its sensor.
    ///
    /// The first sample of a sensor seeds its filter. Later samples predict
    /// across the timestamp gap and update with `R` scaled by the inverse of
    /// the sample's accuracy score, so unreliable readings move the estimate
    /// less.
    pub fn ingest(&mut self, sample: &SensorSample) -> Result<Vector3<f64>> {
        let values = [sample.x, sample.y, sample.z];
        if !all_finite(&values) {
            warn!("rejecting non-finite {:?} sample", sample.kind);
            return Err(MeasurementError::InvalidSample(format!(
                "{:?} sample has non-finite components {:?}",
                sample.kind, values
            )));
        }

        let channel = &mut self.channels[sample.kind.index()];
        let z = column(&values);

        match channel.last_timestamp {
            None => channel.filter.reset(&z, None)?,
            Some(previous) => {
                // abs_diff cannot overflow, however far apart the stamps are.
                let dt = if sample.timestamp_nanos > previous {
                    sample.timestamp_nanos.abs_diff(previous) as f64 * 1e-9
                } else {
                    0.0
                };
                channel.filter.predict(None, dt)?;

                let r = channel.filter.measurement_noise() / sample.accuracy.score();
                channel.filter.update(&z, Some(&r))?;
            }
        }

        channel.last_timestamp = Some(
            channel
                .last_timestamp
                .map_or(sample.timestamp_nanos, |t| t.max(sample.timestamp_nanos)),
        );
        channel.accuracy = sample.accuracy;

        let filtered = channel.value().unwrap_or_else(|| Vector3::from(values));
        trace!("{:?} filtered: {:?}", sample.kind, filtered.as_slice());
        Ok(filtered)
    }

    /// Latest filtered vector for a sensor, if it has reported at all.
    pub fn filtered(&self, kind: SensorKind) -> Option<Vector3<f64>> {
        self.channels[kind.index()].value()
    }

    /// Angle in degrees between the filtered gravity vector and the device z axis.
    pub fn tilt_degrees(&self) -> Option<f64> {
        let a = self.filtered(SensorKind::Accelerometer)?;
        let norm = a.norm();
        if norm < 1e-9 {
            return None;
        }
        Some((a.z / norm).clamp(-1.0, 1.0).acos().to_degrees())
    }

    /// True when `kind` reported at most `max_age_nanos` before `now_nanos`.
    ///
    /// A sensor that never reported is not fresh. Readings stamped after
    /// `now_nanos` count as fresh.
    pub fn is_fresh(
        &self,
        kind: SensorKind,
        now_nanos: TimestampNanos,
        max_age_nanos: i64,
    ) -> bool {
        self.channels[kind.index()].last_timestamp.is_some_and(|last| {
            let age = i128::from(now_nanos) - i128::from(last);
            age <= i128::from(max_age_nanos)
        })
    }

    /// [`SensorFusion::tilt_degrees`], or `None` once the accelerometer is
    /// older than the configured `max_sample_age_ms`.
    pub fn fresh_tilt_degrees(&self, now_nanos: TimestampNanos) -> Option<f64> {
        let max_age = self.config.max_sample_age_nanos();
        if self.is_fresh(SensorKind::Accelerometer, now_nanos, max_age) {
            self.tilt_degrees()
        } else {
            None
        }
    }

    /// Pitch and roll from gravity, plus a tilt-compensated magnetic heading.
    pub fn orientation(&self) -> Option<Orientation> {
        let a = self.filtered(SensorKind::Accelerometer)?;
        if a.norm() < 1e-9 {
            return None;
        }

        let pitch = (-a.x).atan2((a.y * a.y + a.z * a.z).sqrt()).to_degrees();
        let roll = a.y.atan2(a.z).to_degrees();

        let heading = self.filtered(SensorKind::Magnetometer).and_then(|m| {
            let up = a.normalize();
            let east = m.cross(&up);
            if east.norm() < 1e-9 {
                return None;
            }
            let east = east.normalize();
            let north = up.cross(&east);
            let deg = east.y.atan2(north.y).to_degrees();
            Some(deg.rem_euclid(360.0))
        });

        Some(Orientation {
            pitch_deg: pitch,
            roll_deg: roll,
            heading_deg: heading,
        })
    }

    /// Weighted accuracy of the sensors that have reported, in `[0, 1]`.
    ///
    /// Sensors that never reported count as `Unreliable`.
    pub fn overall_accuracy(&self) -> f64 {
        [
            SensorKind::Accelerometer,
            SensorKind::Gyroscope,
            SensorKind::Magnetometer,
        ]
        .iter()
        .map(|&kind| {
            let channel = &self.channels[kind.index()];
            let score = if channel.last_timestamp.is_some() {
                channel.accuracy.score()
            } else {
                SensorAccuracy::Unreliable.score()
            };
            kind.accuracy_weight() * score
        })
        .sum()
    }

    /// True when the device is at rest: gravity-only acceleration and no rotation.
    pub fn is_device_stable(&self) -> bool {
        let threshold = self.config.stability_threshold;
        match (
            self.filtered(SensorKind::Accelerometer),
            self.filtered(SensorKind::Gyroscope),
        ) {
            (Some(a), Some(w)) => (a.norm() - GRAVITY).abs() < threshold && w.norm() < threshold,
            _ => false,
        }
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        let pack = |kind: SensorKind| self.filtered(kind).map(|v| [v.x, v.y, v.z]);
        SensorSnapshot {
            accelerometer: pack(SensorKind::Accelerometer),
            gyroscope: pack(SensorKind::Gyroscope),
            magnetometer: pack(SensorKind::Magnetometer),
            timestamp_nanos: self
                .channels
                .iter()
                .filter_map(|c| c.last_timestamp)
                .max()
                .unwrap_or_default(),
        }
    }

    /// Forgets all sensor history; configured noise levels are kept.
    pub fn reset(&mut self) -> Result<()> {
        for channel in &mut self.channels {
            channel.filter.reset(&linalg::Matrix::zeros(3, 1), None)?;
            channel.last_timestamp = None;
            channel.accuracy = SensorAccuracy::Unreliable;
        }
        Ok(())
    }
}
