// caliper_core/src/types.rs

use nalgebra::{Point2, Point3};
use num_traits::Float;

// --- Core Type Aliases ---
/// A position in image space, in pixels.
pub type Pixel = Point2<f64>;
/// A position in the camera frame, in meters (Z along the optical axis).
pub type CameraPoint = Point3<f64>;
/// Sensor clock time in nanoseconds.
pub type TimestampNanos = i64;

/// True if no value is NaN or infinite.
pub fn all_finite<T: Float>(values: &[T]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// Arithmetic mean, or `None` for an empty input.
pub fn mean<T: Float>(values: impl IntoIterator<Item = T>) -> Option<T> {
    let (sum, count) = values
        .into_iter()
        .fold((T::zero(), 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        None
    } else {
        T::from(count).map(|n| sum / n)
    }
}
