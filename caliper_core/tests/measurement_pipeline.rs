// caliper_core/tests/measurement_pipeline.rs

use approx::{assert_abs_diff_eq, assert_relative_eq};
use caliper_core::linalg::{column, Matrix};
use caliper_core::prelude::*;

fn px(x: f64, y: f64) -> MeasurementPoint {
    MeasurementPoint::from_pixel(x, y).unwrap()
}

fn engine_with_factor(meters_per_pixel: f64) -> MeasurementEngine {
    let engine = MeasurementEngine::default();
    engine.calibrate_manual(1.0, 1.0 / meters_per_pixel).unwrap();
    engine
}

fn area_m2(engine: &MeasurementEngine, points: &[MeasurementPoint]) -> f64 {
    engine.measure_area(points).unwrap().standard_value().unwrap()
}

#[test]
fn credit_card_calibration_measures_the_card() {
    let engine = MeasurementEngine::default();
    let calibration = engine.calibrate_with_reference_object(0.0856, 200.0).unwrap();
    assert_relative_eq!(calibration.factor, 0.000428, max_relative = 1e-12);
    assert_eq!(calibration.source, CalibrationSource::ReferenceObject);

    let width = engine.measure_distance(&px(10.0, 10.0), &px(210.0, 10.0), false).unwrap();
    assert_eq!(width.unit(), "cm");
    assert_abs_diff_eq!(width.value(), 8.56, epsilon = 1e-9);
    assert_eq!(width.method(), MeasurementMethod::Calibrated2d);
    assert!(width.confidence() > 0.0 && width.confidence() <= 1.0);
}

#[test]
fn unit_square_is_one_square_meter() {
    let engine = engine_with_factor(0.01);
    let square = [px(0.0, 0.0), px(100.0, 0.0), px(100.0, 100.0), px(0.0, 100.0)];
    let area = engine.measure_area(&square).unwrap();
    assert_eq!(area.unit(), "m²");
    assert_abs_diff_eq!(area.value(), 1.0, epsilon = 1e-12);
}

#[test]
fn shoelace_ignores_vertex_order() {
    let engine = engine_with_factor(0.01);
    let polygon = vec![
        px(0.0, 0.0),
        px(120.0, 10.0),
        px(150.0, 90.0),
        px(60.0, 140.0),
        px(-20.0, 70.0),
    ];
    let expected = area_m2(&engine, &polygon);

    let mut rotated = polygon.clone();
    rotated.rotate_left(2);
    assert_relative_eq!(area_m2(&engine, &rotated), expected, max_relative = 1e-12);

    let mut reversed = polygon;
    reversed.reverse();
    assert_relative_eq!(area_m2(&engine, &reversed), expected, max_relative = 1e-12);
}

#[test]
fn right_angle_in_pixels() {
    let engine = MeasurementEngine::default();
    let angle = engine
        .measure_angle(&px(50.0, 0.0), &px(0.0, 0.0), &px(0.0, 30.0))
        .unwrap();
    assert_eq!(angle.kind(), MeasurementKind::Angle);
    assert_abs_diff_eq!(angle.value(), 90.0, epsilon = 1e-9);
}

#[test]
fn uncalibrated_engine_refuses_lengths_and_areas() {
    let engine = MeasurementEngine::default();
    assert!(matches!(
        engine.measure_distance(&px(0.0, 0.0), &px(1.0, 1.0), false),
        Err(MeasurementError::NotCalibrated)
    ));
    assert!(matches!(
        engine.measure_area(&[px(0.0, 0.0), px(1.0, 0.0), px(0.0, 1.0)]),
        Err(MeasurementError::NotCalibrated)
    ));

    engine.calibrate_manual(1.0, 100.0).unwrap();
    engine.reset();
    assert!(matches!(
        engine.measure_distance(&px(0.0, 0.0), &px(1.0, 1.0), false),
        Err(MeasurementError::NotCalibrated)
    ));
}

#[test]
fn distance_is_symmetric() {
    let engine = engine_with_factor(0.002);
    let a = px(12.0, 40.0);
    let b = px(310.0, -25.0);
    let ab = engine.measure_distance(&a, &b, false).unwrap();
    let ba = engine.measure_distance(&b, &a, false).unwrap();
    assert_eq!(ab.unit(), ba.unit());
    assert_relative_eq!(ab.value(), ba.value(), max_relative = 1e-12);
}

#[test]
fn larger_reference_means_longer_distances() {
    let a = px(0.0, 0.0);
    let b = px(400.0, 300.0);
    let mut previous = 0.0;
    for size in [0.02, 0.0856, 0.15, 0.3, 1.0] {
        let engine = MeasurementEngine::default();
        engine.calibrate_with_reference_object(size, 200.0).unwrap();
        let meters = engine
            .measure_distance(&a, &b, false)
            .unwrap()
            .standard_value()
            .unwrap();
        assert!(meters > previous, "{meters} m after {previous} m");
        previous = meters;
    }
}

#[test]
fn doubling_measured_pixels_halves_the_factor() {
    let engine = MeasurementEngine::default();
    let f1 = engine.calibrate_with_reference_object(0.0856, 200.0).unwrap().factor;
    let f2 = engine.calibrate_with_reference_object(0.0856, 400.0).unwrap().factor;
    assert_relative_eq!(f1 / f2, 2.0, max_relative = 1e-12);

    for pixels in [50.0, 123.0, 800.0] {
        let f = engine.calibrate_manual(0.5, pixels).unwrap().factor;
        let doubled = engine.calibrate_manual(0.5, 2.0 * pixels).unwrap().factor;
        assert_relative_eq!(f, 2.0 * doubled, max_relative = 1e-12);
    }
}

#[test]
fn invalid_engine_config_is_an_error_not_a_panic() {
    for config in [
        EngineConfig {
            min_confidence: 1.5,
            ..EngineConfig::default()
        },
        EngineConfig {
            min_confidence: f64::NAN,
            ..EngineConfig::default()
        },
        EngineConfig {
            min_confidence: 0.0,
            ..EngineConfig::default()
        },
        EngineConfig {
            agreement_bonus: 0.5,
            ..EngineConfig::default()
        },
    ] {
        assert!(matches!(
            MeasurementEngine::new(config),
            Err(MeasurementError::InvalidConfig(_))
        ));
    }
}

#[test]
fn zero_confidence_points_still_score_above_zero() {
    let engine = MeasurementEngine::new(EngineConfig {
        min_confidence: 0.01,
        ..EngineConfig::default()
    })
    .unwrap();
    engine.calibrate_manual(1.0, 100.0).unwrap();
    let a = MeasurementPoint::new(0.0, 0.0, None, 0.0).unwrap();
    let b = MeasurementPoint::new(10.0, 0.0, None, 0.0).unwrap();
    let result = engine.measure_distance(&a, &b, false).unwrap();
    assert_abs_diff_eq!(result.confidence(), 0.01);
}

#[test]
fn confidence_stays_within_bounds() {
    let engine = engine_with_factor(0.001);
    let floor = engine.config().min_confidence;

    for tilt in [None, Some(0.0), Some(30.0), Some(89.0)] {
        engine.set_device_tilt(tilt);
        for c in [0.0, 0.3, 1.0] {
            let a = MeasurementPoint::new(0.0, 0.0, None, c).unwrap();
            let b = MeasurementPoint::new(50.0, 0.0, None, c).unwrap();
            let result = engine.measure_distance(&a, &b, false).unwrap();
            assert!(
                (floor..=1.0).contains(&result.confidence()),
                "tilt {tilt:?}, point confidence {c}: {}",
                result.confidence()
            );
        }
    }
}

#[test]
fn depth_points_use_the_3d_path() {
    let engine = engine_with_factor(0.001);
    let a = MeasurementPoint::from_world(0.0, 0.0, 1.0).unwrap();
    let b = MeasurementPoint::from_world(3.0, 4.0, 1.0).unwrap();
    let result = engine.measure_distance(&a, &b, true).unwrap();
    assert_eq!(result.method(), MeasurementMethod::Depth3d);
    assert_abs_diff_eq!(result.standard_value().unwrap(), 5.0, epsilon = 1e-12);
}

#[test]
fn kalman_smoother_converges_on_a_constant() {
    let mut filter = KalmanFilter::smoother(1, 1e-5, 0.01).unwrap();
    let z = column(&[4.2]);
    for _ in 0..200 {
        filter.predict(None, 0.0).unwrap();
        filter.update(&z, None).unwrap();
    }
    assert_abs_diff_eq!(filter.state()[(0, 0)], 4.2, epsilon = 1e-3);
    assert!(filter.covariance()[(0, 0)] < 0.05);
}

#[test]
fn singular_innovation_leaves_the_filter_untouched() {
    let mut filter = KalmanFilter::new(1, 1, 0).unwrap();
    filter.set_state(column(&[2.0])).unwrap();
    filter.set_measurement_noise(Matrix::zeros(1, 1)).unwrap();

    // H is zero, so S = H P H^T + R = 0.
    let err = filter.update(&column(&[7.0]), None).unwrap_err();
    assert!(matches!(err, MeasurementError::Processing(_)));
    assert_eq!(filter.state()[(0, 0)], 2.0);
    assert!(filter.last_innovation().is_none());
}

#[test]
fn smartphone_camera_round_trips_near_the_center() {
    let camera = CameraModel::create_default(1280, 960, None).unwrap();
    assert!(camera.is_estimated());

    for (x, y) in [(640.0, 480.0), (700.0, 520.0), (580.0, 430.0), (760.0, 400.0)] {
        let pixel = Pixel::new(x, y);
        let back = camera.undistort_point(&camera.distort_point(&pixel));
        assert_abs_diff_eq!(back.x, x, epsilon = 1e-3);
        assert_abs_diff_eq!(back.y, y, epsilon = 1e-3);
    }
}

#[test]
fn fusion_tilt_feeds_the_engine() {
    let g = 9.80665;
    let theta = 30f64.to_radians();
    let mut fusion = SensorFusion::new(FusionConfig::default()).unwrap();
    fusion
        .ingest(&SensorSample::new(
            SensorKind::Accelerometer,
            [0.0, g * theta.sin(), g * theta.cos()],
            0,
        ))
        .unwrap();

    let engine = engine_with_factor(0.001);
    engine.update_tilt_from(&fusion, 0);
    assert_abs_diff_eq!(engine.device_tilt().unwrap(), 30.0, epsilon = 1e-9);

    let level = MeasurementEngine::default();
    level.calibrate_manual(1.0, 1000.0).unwrap();
    level.set_device_tilt(Some(0.0));

    let tilted = engine.measure_distance(&px(0.0, 0.0), &px(100.0, 0.0), false).unwrap();
    let flat = level.measure_distance(&px(0.0, 0.0), &px(100.0, 0.0), false).unwrap();
    assert!(tilted.confidence() < flat.confidence());
}
