// caliper_cli/src/session/runner.rs

use anyhow::{anyhow, Context, Result};
use caliper_core::estimation::fusion::Orientation;
use caliper_core::prelude::*;
use log::{debug, info, warn};
use serde::Serialize;

use super::{CalibrationStep, MeasurementRequest, RequestKind, SessionConfig};

/// Outcome of one measurement request. Failures are reported, not fatal.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MeasurementResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub calibration: Option<Calibration>,
    pub orientation: Option<Orientation>,
    pub tilt_degrees: Option<f64>,
    pub sensor_accuracy: f64,
    pub device_stable: bool,
    pub rejected_samples: usize,
    pub outcomes: Vec<Outcome>,
}

/// Replays samples, applies the calibration and runs every request.
///
/// Configuration problems (a camera step without a camera, an invalid
/// calibration) abort the run. Individual measurement errors are recorded in
/// their [`Outcome`].
pub fn run(session: &SessionConfig) -> Result<SessionReport> {
    let mut fusion =
        SensorFusion::new(session.fusion.clone()).context("invalid fusion configuration")?;
    let mut rejected_samples = 0;
    for sample in &session.samples {
        if let Err(e) = fusion.ingest(sample) {
            warn!("skipping sample at {} ns: {e}", sample.timestamp_nanos);
            rejected_samples += 1;
        }
    }
    debug!(
        "replayed {} samples ({} rejected)",
        session.samples.len(),
        rejected_samples
    );

    let camera = session
        .camera
        .as_ref()
        .map(|c| c.build())
        .transpose()
        .context("invalid camera")?;

    let engine =
        MeasurementEngine::new(session.engine.clone()).context("invalid engine configuration")?;
    // Replay time is the newest sample stamp.
    let snapshot = fusion.snapshot();
    engine.update_tilt_from(&fusion, snapshot.timestamp_nanos);

    if let Some(step) = &session.calibration {
        calibrate(&engine, step, camera.as_ref())?;
    }

    let outcomes = session
        .measurements
        .iter()
        .enumerate()
        .map(|(i, request)| {
            let label = request
                .label
                .clone()
                .unwrap_or_else(|| format!("#{}", i + 1));
            match measure(&engine, camera.as_ref(), request, snapshot) {
                Ok(result) => Outcome {
                    label,
                    result: Some(result),
                    error: None,
                },
                Err(e) => {
                    warn!("{label}: {e:#}");
                    Outcome {
                        label,
                        result: None,
                        error: Some(format!("{e:#}")),
                    }
                }
            }
        })
        .collect();

    Ok(SessionReport {
        calibration: engine.calibration(),
        orientation: fusion.orientation(),
        tilt_degrees: engine.device_tilt(),
        sensor_accuracy: fusion.overall_accuracy(),
        device_stable: fusion.is_device_stable(),
        rejected_samples,
        outcomes,
    })
}

fn calibrate(
    engine: &MeasurementEngine,
    step: &CalibrationStep,
    camera: Option<&CameraModel>,
) -> Result<()> {
    let calibration = match step {
        CalibrationStep::ReferenceObject {
            known_size_m,
            measured_pixels,
        } => engine.calibrate_with_reference_object(*known_size_m, *measured_pixels)?,
        CalibrationStep::Manual {
            known_distance_m,
            pixel_distance,
        } => engine.calibrate_manual(*known_distance_m, *pixel_distance)?,
        CalibrationStep::Camera { plane_distance_m } => {
            let camera =
                camera.ok_or_else(|| anyhow!("camera calibration needs a [camera] table"))?;
            engine.calibrate_with_camera(camera, *plane_distance_m)?
        }
        CalibrationStep::Detection { objects } => match engine.calibrate_from_detection(objects)? {
            Some(calibration) => calibration,
            None => {
                warn!("no detected object qualified; continuing uncalibrated");
                return Ok(());
            }
        },
    };
    info!(
        "calibration factor {:.6e} m/px ({:?})",
        calibration.factor, calibration.source
    );
    Ok(())
}

fn measure(
    engine: &MeasurementEngine,
    camera: Option<&CameraModel>,
    request: &MeasurementRequest,
    snapshot: SensorSnapshot,
) -> Result<MeasurementResult> {
    let attach = |points: &[MeasurementPoint]| -> Vec<MeasurementPoint> {
        points.iter().map(|p| p.with_sensor(snapshot)).collect()
    };
    let pair = |points: &[MeasurementPoint]| -> Result<[MeasurementPoint; 2]> {
        let [a, b]: [MeasurementPoint; 2] = attach(points).try_into().map_err(|v: Vec<_>| {
            MeasurementError::InsufficientPoints {
                expected: 2,
                actual: v.len(),
            }
        })?;
        Ok([a, b])
    };

    let result = match &request.kind {
        RequestKind::Distance { points, use_3d } => {
            let [a, b] = pair(points)?;
            engine.measure_distance(&a, &b, *use_3d)?
        }
        RequestKind::PlaneDistance {
            points,
            plane_distance_m,
        } => {
            let camera =
                camera.ok_or_else(|| anyhow!("plane distance needs a [camera] table"))?;
            let [a, b] = pair(points)?;
            engine.measure_distance_on_plane(camera, &a, &b, *plane_distance_m)?
        }
        RequestKind::Area { points } => engine.measure_area(&attach(points))?,
        RequestKind::Angle { points } => match attach(points).as_slice() {
            [a, vertex, b] => engine.measure_angle(a, vertex, b)?,
            other => {
                return Err(MeasurementError::InsufficientPoints {
                    expected: 3,
                    actual: other.len(),
                }
                .into())
            }
        },
        RequestKind::Volume {
            length,
            width,
            height,
        } => engine.measure_volume(*length, *width, *height)?,
    };

    match &request.convert_to {
        Some(unit) => Ok(result.convert_to(unit)?),
        None => Ok(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::SESSION;
    use approx::assert_abs_diff_eq;
    use figment::{
        providers::{Format, Toml},
        Figment,
    };

    fn session(toml: &str) -> SessionConfig {
        SessionConfig::from_figment(Figment::from(Toml::string(toml))).unwrap()
    }

    #[test]
    fn runs_the_reference_session() {
        let report = run(&session(SESSION)).unwrap();
        assert_abs_diff_eq!(report.calibration.unwrap().factor, 0.000428, epsilon = 1e-15);
        assert_abs_diff_eq!(report.tilt_degrees.unwrap(), 0.0, epsilon = 1e-9);
        assert_eq!(report.outcomes.len(), 4);

        let card = report.outcomes[0].result.as_ref().unwrap();
        assert_eq!(card.unit(), "cm");
        assert_abs_diff_eq!(card.value(), 8.56, epsilon = 1e-9);
        assert!(card.points()[0].sensor.is_some());

        // 10000 px² at 0.000428 m/px is 18.3184 cm².
        let area = report.outcomes[1].result.as_ref().unwrap();
        assert_eq!(area.unit(), "cm²");
        assert_abs_diff_eq!(area.value(), 18.3184, epsilon = 1e-9);

        let angle = report.outcomes[2].result.as_ref().unwrap();
        assert_abs_diff_eq!(angle.value(), 90.0, epsilon = 1e-9);

        let volume = report.outcomes[3].result.as_ref().unwrap();
        assert_abs_diff_eq!(volume.value(), 0.06, epsilon = 1e-12);
    }

    #[test]
    fn measurement_errors_are_reported_per_request() {
        let report = run(&session(
            r#"
            [[measurements]]
            type = "distance"
            points = [{ x = 0.0, y = 0.0 }, { x = 1.0, y = 0.0 }]

            [[measurements]]
            type = "angle"
            points = [{ x = 0.0, y = 0.0 }, { x = 1.0, y = 0.0 }]

            [[measurements]]
            type = "volume"
            length = 1.0
            width = 1.0
            height = 1.0
            "#,
        ))
        .unwrap();

        assert!(report.calibration.is_none());
        assert!(report.outcomes[0].error.as_ref().unwrap().contains("not calibrated"));
        assert!(report.outcomes[1].error.is_some());
        assert!(report.outcomes[2].result.is_some());
    }

    #[test]
    fn camera_steps_require_a_camera() {
        let err = run(&session(
            r#"
            [calibration]
            method = "camera"
            plane_distance_m = 1.0
            "#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("[camera]"));
    }

    #[test]
    fn invalid_engine_config_aborts_the_run() {
        let err = run(&session("[engine]\nmin_confidence = 1.5\n")).unwrap_err();
        assert!(format!("{err:#}").contains("min_confidence"));

        let toml = "[fusion.gyroscope]\nprocess_noise = -1.0\nmeasurement_noise = 0.1\n";
        let err = run(&session(toml)).unwrap_err();
        assert!(format!("{err:#}").contains("gyroscope.process_noise"));
    }

    #[test]
    fn stale_accelerometer_leaves_tilt_unset() {
        let report = run(&session(
            r#"
            [[samples]]
            kind = "accelerometer"
            x = 0.0
            y = 0.0
            z = 9.80665
            timestamp_nanos = 0

            [[samples]]
            kind = "gyroscope"
            x = 0.0
            y = 0.0
            z = 0.0
            timestamp_nanos = 5000000000
            "#,
        ))
        .unwrap();
        assert!(report.orientation.is_some());
        assert!(report.tilt_degrees.is_none());
    }

    #[test]
    fn bad_samples_are_counted_not_fatal() {
        let mut s = session("");
        s.samples.push(SensorSample::new(
            SensorKind::Accelerometer,
            [f64::NAN, 0.0, 9.8],
            0,
        ));
        let report = run(&s).unwrap();
        assert_eq!(report.rejected_samples, 1);
        assert!(report.orientation.is_none());
    }
}
