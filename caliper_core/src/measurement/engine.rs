// caliper_core/src/measurement/engine.rs

//! The measurement engine: calibration state, geometry, confidence and the
//! result cache.
//!
//! Calibration and the cache live behind one mutex. A measurement takes a
//! snapshot of the calibration under the lock, computes without holding it,
//! and then caches the result only if no recalibration happened meanwhile.

use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{MeasurementError, Result};
use crate::estimation::fusion::SensorFusion;
use crate::measurement::cache::{CacheKey, LruCache};
use crate::measurement::confidence::{self, ConfidenceInputs};
use crate::measurement::point::MeasurementPoint;
use crate::measurement::reference::DetectedObject;
use crate::measurement::result::{MeasurementKind, MeasurementMethod, MeasurementResult};
use crate::measurement::units;
use crate::models::camera::CameraModel;
use crate::types::{Pixel, TimestampNanos};

/// Where the current calibration factor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationSource {
    ReferenceObject,
    Manual,
    /// Derived from camera intrinsics and a known plane distance.
    Camera,
    Detection,
}

/// Meters per pixel, and when and how that was established.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub factor: f64,
    pub source: CalibrationSource,
    pub calibrated_at: DateTime<Utc>,
}

impl Calibration {
    fn planar_method(&self) -> MeasurementMethod {
        match self.source {
            CalibrationSource::Camera => MeasurementMethod::FocalLength,
            _ => MeasurementMethod::Calibrated2d,
        }
    }
}

#[derive(Debug)]
struct EngineState {
    calibration: Option<Calibration>,
    /// Bumped on every calibration or tilt change; stale results are not cached.
    generation: u64,
    cache: LruCache<CacheKey, MeasurementResult>,
}

/// Turns points into measurements. Share one instance by reference or `Arc`.
#[derive(Debug)]
pub struct MeasurementEngine {
    config: EngineConfig,
    state: Mutex<EngineState>,
    tilt_degrees: Mutex<Option<f64>>,
}

impl Default for MeasurementEngine {
    fn default() -> Self {
        Self::with_checked_config(EngineConfig::default())
    }
}

fn out_of_range(value: f64, min: f64, max: f64) -> MeasurementError {
    MeasurementError::MeasurementOutOfRange { value, min, max }
}

fn ensure_positive(value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(out_of_range(value, f64::MIN_POSITIVE, f64::MAX))
    }
}

/// Twice the signed polygon area, from the shoelace sum.
fn shoelace(points: &[MeasurementPoint]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let (a, b) = (&points[i], &points[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum()
}

impl MeasurementEngine {
    /// Fails with [`MeasurementError::InvalidConfig`] when `config` does not validate.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_checked_config(config))
    }

    fn with_checked_config(config: EngineConfig) -> Self {
        let cache = LruCache::new(config.cache_capacity);
        Self {
            config,
            state: Mutex::new(EngineState {
                calibration: None,
                generation: 0,
                cache,
            }),
            tilt_degrees: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // == Calibration ==
    // =========================================================================

    pub fn is_calibrated(&self) -> bool {
        self.state.lock().calibration.is_some()
    }

    pub fn calibration(&self) -> Option<Calibration> {
        self.state.lock().calibration
    }

    pub fn calibration_factor(&self) -> Option<f64> {
        self.calibration().map(|c| c.factor)
    }

    fn apply_calibration(&self, factor: f64, source: CalibrationSource) -> Calibration {
        let calibration = Calibration {
            factor,
            source,
            calibrated_at: Utc::now(),
        };
        let mut state = self.state.lock();
        state.calibration = Some(calibration);
        state.generation += 1;
        state.cache.clear();
        info!("calibrated ({source:?}): {factor:.6e} m/px");
        calibration
    }

    fn check_reference_size(&self, size: f64) -> Result<()> {
        let (min, max) = (
            self.config.min_calibration_size,
            self.config.max_calibration_size,
        );
        if (min..=max).contains(&size) {
            Ok(())
        } else {
            Err(MeasurementError::InvalidCalibrationDistance {
                distance: size,
                min,
                max,
            })
        }
    }

    /// Calibrates from an object of known size spanning `measured_pixels`.
    ///
    /// Replaces any previous calibration and clears the result cache.
    pub fn calibrate_with_reference_object(
        &self,
        known_size_m: f64,
        measured_pixels: f64,
    ) -> Result<Calibration> {
        self.check_reference_size(known_size_m)?;
        ensure_positive(measured_pixels)?;
        Ok(self.apply_calibration(
            known_size_m / measured_pixels,
            CalibrationSource::ReferenceObject,
        ))
    }

    /// Calibrates from a user-entered distance between two tapped pixels.
    pub fn calibrate_manual(
        &self,
        known_distance_m: f64,
        pixel_distance: f64,
    ) -> Result<Calibration> {
        self.check_reference_size(known_distance_m)?;
        ensure_positive(pixel_distance)?;
        Ok(self.apply_calibration(known_distance_m / pixel_distance, CalibrationSource::Manual))
    }

    /// Meters per pixel on a fronto-parallel plane `plane_distance_m` away.
    pub fn calibrate_with_camera(
        &self,
        camera: &CameraModel,
        plane_distance_m: f64,
    ) -> Result<Calibration> {
        ensure_positive(plane_distance_m)?;
        let (pitch_mm, _) = camera.pixel_pitch_mm();
        let (focal_mm, _) = camera.focal_length_mm();
        let factor = plane_distance_m * pitch_mm / focal_mm;
        Ok(self.apply_calibration(factor, CalibrationSource::Camera))
    }

    /// Calibrates from the first confidently detected object of known size.
    ///
    /// Returns `Ok(None)` when no detection qualifies; the current calibration
    /// is then left alone.
    pub fn calibrate_from_detection(
        &self,
        objects: &[DetectedObject],
    ) -> Result<Option<Calibration>> {
        let candidate = objects.iter().find_map(|obj| {
            let size = obj.known_size()?;
            (obj.confidence > self.config.detection_min_confidence).then_some((obj, size))
        });

        let Some((obj, size)) = candidate else {
            debug!("no detection qualifies for calibration");
            return Ok(None);
        };

        self.check_reference_size(size)?;
        let pixels = obj.bounding_box.width();
        ensure_positive(pixels)?;
        debug!("calibrating from detected '{}' ({:.0} px)", obj.label, pixels);
        Ok(Some(
            self.apply_calibration(size / pixels, CalibrationSource::Detection),
        ))
    }

    /// Back to the uncalibrated state, with an empty cache.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.calibration = None;
        state.generation += 1;
        state.cache.clear();
        info!("measurement engine reset");
    }

    // =========================================================================
    // == Device Tilt ==
    // =========================================================================

    /// Cached results carry the confidence of the old tilt, so a change drops them.
    pub fn set_device_tilt(&self, tilt_degrees: Option<f64>) {
        let tilt = tilt_degrees.filter(|t| t.is_finite());
        let changed = {
            let mut current = self.tilt_degrees.lock();
            let changed = *current != tilt;
            *current = tilt;
            changed
        };
        if changed {
            let mut state = self.state.lock();
            state.generation += 1;
            state.cache.clear();
        }
    }

    /// Pulls the current tilt from the fusion pipeline. A stale accelerometer
    /// estimate (see [`SensorFusion::fresh_tilt_degrees`]) clears the tilt.
    pub fn update_tilt_from(&self, fusion: &SensorFusion, now_nanos: TimestampNanos) {
        self.set_device_tilt(fusion.fresh_tilt_degrees(now_nanos));
    }

    pub fn device_tilt(&self) -> Option<f64> {
        *self.tilt_degrees.lock()
    }

    // =========================================================================
    // == Cache ==
    // =========================================================================

    pub fn cached_results(&self) -> usize {
        self.state.lock().cache.len()
    }

    pub fn clear_cache(&self) {
        self.state.lock().cache.clear();
    }

    /// Returns the cached result for `key`, or the calibration snapshot and
    /// generation to compute it with.
    fn lookup(
        &self,
        key: &CacheKey,
    ) -> std::result::Result<MeasurementResult, (Option<Calibration>, u64)> {
        let mut state = self.state.lock();
        match state.cache.get(key) {
            Some(hit) => {
                debug!("cache hit: {} via {}", key.kind, key.method);
                Ok(hit)
            }
            None => Err((state.calibration, state.generation)),
        }
    }

    fn store(&self, key: CacheKey, generation: u64, result: &MeasurementResult) {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!("calibration changed during measurement; result not cached");
            return;
        }
        if let Some(evicted) = state.cache.insert(key, result.clone()) {
            debug!("cache full; evicted {} via {}", evicted.kind, evicted.method);
        }
    }

    fn score(
        &self,
        points: &[&MeasurementPoint],
        calibrated: bool,
        secondary: Option<(f64, f64)>,
    ) -> f64 {
        confidence::score(
            &self.config,
            &ConfidenceInputs {
                point_confidences: points.iter().map(|p| p.confidence).collect(),
                tilt_degrees: self.device_tilt(),
                calibrated,
                secondary,
            },
        )
    }

    // =========================================================================
    // == Measurements ==
    // =========================================================================

    /// Distance between two points, in an auto-selected length unit.
    ///
    /// With `use_3d` and depth on both points the metric 3D distance is used
    /// directly. Otherwise the pixel distance is scaled by the calibration
    /// factor. Either way the engine must be calibrated. When both estimates
    /// exist, the other one serves as the agreement check.
    pub fn measure_distance(
        &self,
        p1: &MeasurementPoint,
        p2: &MeasurementPoint,
        use_3d: bool,
    ) -> Result<MeasurementResult> {
        let depth = p1.distance_3d(p2);
        let method_hint = match (use_3d, depth) {
            (true, Some(_)) => MeasurementMethod::Depth3d,
            _ => self
                .calibration()
                .map_or(MeasurementMethod::Calibrated2d, |c| c.planar_method()),
        };
        let key = CacheKey::new(
            MeasurementKind::Distance,
            &[p1.clone(), p2.clone()],
            &[u64::from(use_3d)],
            method_hint,
        );

        let (calibration, generation) = match self.lookup(&key) {
            Ok(hit) => return Ok(hit),
            Err(snapshot) => snapshot,
        };
        let calibration = calibration.ok_or(MeasurementError::NotCalibrated)?;

        let planar = p1.distance_2d(p2) * calibration.factor;
        let (meters, method, secondary) = match (use_3d, depth) {
            (true, Some(d)) => (d, MeasurementMethod::Depth3d, Some((d, planar))),
            (_, Some(d)) => (planar, calibration.planar_method(), Some((planar, d))),
            (_, None) => (planar, calibration.planar_method(), None),
        };
        if !meters.is_finite() {
            return Err(MeasurementError::Processing(format!(
                "distance evaluated to {meters}"
            )));
        }

        let (value, unit) = units::auto_length(meters);
        let result = MeasurementResult::new(
            MeasurementKind::Distance,
            value,
            unit,
            self.score(&[p1, p2], true, secondary),
            vec![p1.clone(), p2.clone()],
            method,
        )?;
        debug!("measured {result}");
        // The calibration may have changed between hint and snapshot.
        if method == method_hint {
            self.store(key, generation, &result);
        }
        Ok(result)
    }

    /// Distance between two pixels on a plane at a known distance.
    ///
    /// Needs no calibration factor. Confidence takes the uncalibrated penalty
    /// when the camera's focal length was only estimated.
    pub fn measure_distance_on_plane(
        &self,
        camera: &CameraModel,
        p1: &MeasurementPoint,
        p2: &MeasurementPoint,
        plane_distance_m: f64,
    ) -> Result<MeasurementResult> {
        let params = camera.parameters();
        let mut extra = vec![plane_distance_m.to_bits()];
        extra.extend(params.focal_length.iter().map(|v| v.to_bits()));
        extra.extend(params.principal_point.iter().map(|v| v.to_bits()));
        extra.extend(<[f64; 5]>::from(params.distortion).iter().map(|v| v.to_bits()));
        let key = CacheKey::new(
            MeasurementKind::Distance,
            &[p1.clone(), p2.clone()],
            &extra,
            MeasurementMethod::PlaneProjection,
        );

        let generation = match self.lookup(&key) {
            Ok(hit) => return Ok(hit),
            Err((_, generation)) => generation,
        };

        let meters = camera.calculate_real_distance(
            &Pixel::new(p1.x, p1.y),
            &Pixel::new(p2.x, p2.y),
            plane_distance_m,
        )?;
        let (value, unit) = units::auto_length(meters);
        let result = MeasurementResult::new(
            MeasurementKind::Distance,
            value,
            unit,
            self.score(&[p1, p2], !camera.is_estimated(), None),
            vec![p1.clone(), p2.clone()],
            MeasurementMethod::PlaneProjection,
        )?;
        self.store(key, generation, &result);
        Ok(result)
    }

    /// Polygon area by the shoelace formula, scaled by the factor squared.
    pub fn measure_area(&self, points: &[MeasurementPoint]) -> Result<MeasurementResult> {
        MeasurementKind::Area.check_point_count(points.len())?;

        let method_hint = self
            .calibration()
            .map_or(MeasurementMethod::Calibrated2d, |c| c.planar_method());
        let key = CacheKey::new(MeasurementKind::Area, points, &[], method_hint);

        let (calibration, generation) = match self.lookup(&key) {
            Ok(hit) => return Ok(hit),
            Err(snapshot) => snapshot,
        };
        let calibration = calibration.ok_or(MeasurementError::NotCalibrated)?;
        let method = calibration.planar_method();

        let pixel_area = shoelace(points).abs() / 2.0;
        let square_meters = pixel_area * calibration.factor * calibration.factor;
        let (value, unit) = units::auto_area(square_meters);

        let refs: Vec<&MeasurementPoint> = points.iter().collect();
        let result = MeasurementResult::new(
            MeasurementKind::Area,
            value,
            unit,
            self.score(&refs, true, None),
            points.to_vec(),
            method,
        )?;
        debug!("measured {result}");
        if method == method_hint {
            self.store(key, generation, &result);
        }
        Ok(result)
    }

    /// The angle at `vertex` between the arms to `p1` and `p2`, in degrees.
    ///
    /// Uses 3D vectors when all three points carry depth. Angles are scale
    /// free, so no calibration is required; an uncalibrated engine still
    /// lowers the confidence.
    pub fn measure_angle(
        &self,
        p1: &MeasurementPoint,
        vertex: &MeasurementPoint,
        p2: &MeasurementPoint,
    ) -> Result<MeasurementResult> {
        let key = CacheKey::new(
            MeasurementKind::Angle,
            &[p1.clone(), vertex.clone(), p2.clone()],
            &[],
            MeasurementMethod::Geometric,
        );
        let (calibration, generation) = match self.lookup(&key) {
            Ok(hit) => return Ok(hit),
            Err(snapshot) => snapshot,
        };

        let arm = |p: &MeasurementPoint| -> [f64; 3] {
            let dz = match (p.z, vertex.z) {
                (Some(a), Some(b)) if p1.has_depth() && p2.has_depth() => a - b,
                _ => 0.0,
            };
            [p.x - vertex.x, p.y - vertex.y, dz]
        };
        let (a, b) = (arm(p1), arm(p2));
        let dot: f64 = a.iter().zip(&b).map(|(u, v)| u * v).sum();
        let norm = |v: &[f64; 3]| v.iter().map(|c| c * c).sum::<f64>().sqrt();
        let (na, nb) = (norm(&a), norm(&b));
        if na < f64::EPSILON || nb < f64::EPSILON {
            return Err(out_of_range(na.min(nb), f64::EPSILON, f64::MAX));
        }

        let cosine = (dot / (na * nb)).clamp(-1.0, 1.0);
        let degrees = cosine.acos().to_degrees();

        let result = MeasurementResult::new(
            MeasurementKind::Angle,
            degrees,
            "°",
            self.score(&[p1, vertex, p2], calibration.is_some(), None),
            vec![p1.clone(), vertex.clone(), p2.clone()],
            MeasurementMethod::Geometric,
        )?;
        debug!("measured {result}");
        self.store(key, generation, &result);
        Ok(result)
    }

    /// Box volume from explicit dimensions in meters, reported in m³.
    pub fn measure_volume(
        &self,
        length: f64,
        width: f64,
        height: f64,
    ) -> Result<MeasurementResult> {
        for dim in [length, width, height] {
            ensure_positive(dim)?;
        }
        let key = CacheKey::new(
            MeasurementKind::Volume,
            &[],
            &[length.to_bits(), width.to_bits(), height.to_bits()],
            MeasurementMethod::Dimensions,
        );
        let generation = match self.lookup(&key) {
            Ok(hit) => return Ok(hit),
            Err((_, generation)) => generation,
        };

        let cubic_meters = length * width * height;
        if !cubic_meters.is_finite() {
            return Err(out_of_range(cubic_meters, 0.0, f64::MAX));
        }
        let result = MeasurementResult::new(
            MeasurementKind::Volume,
            cubic_meters,
            units::standard_unit(units::UnitFamily::Volume),
            self.config.volume_confidence.clamp(self.config.min_confidence, 1.0),
            Vec::new(),
            MeasurementMethod::Dimensions,
        )?;
        self.store(key, generation, &result);
        Ok(result)
    }
}
