// caliper_core/src/models/camera.rs

//! Pinhole camera with Brown-Conrady lens distortion.
//!
//! Three coordinate spaces are involved:
//! * pixel space: `(u, v)` with the origin at the top-left image corner,
//! * normalized space: `(x, y) = ((u - cx) / fx, (v - cy) / fy)`, the ray
//!   direction on the `Z = 1` plane,
//! * the camera frame: metric 3D points, `Z` along the optical axis.

use nalgebra::{Matrix3, Vector2};
use serde::{Deserialize, Serialize};

use crate::error::{MeasurementError, Result};
use crate::types::{all_finite, CameraPoint, Pixel};

/// Diagonal field of view assumed when no focal length has been measured.
pub const DEFAULT_DIAGONAL_FOV_DEG: f64 = 65.0;
/// A typical phone sensor, in millimeters.
pub const DEFAULT_SENSOR_SIZE_MM: [f64; 2] = [4.8, 3.6];

pub const MAX_UNDISTORT_ITERATIONS: usize = 5;
/// Fixed-point iteration stops once the squared correction, in pixels^2,
/// drops below this.
pub const UNDISTORT_EPSILON: f64 = 1e-5;

// =========================================================================
// == Distortion ==
// =========================================================================

/// Radial (`k1`, `k2`, `k3`) and tangential (`p1`, `p2`) coefficients.
///
/// Serialized in the conventional `[k1, k2, p1, p2, k3]` order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 5]", into = "[f64; 5]")]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl From<[f64; 5]> for Distortion {
    fn from(c: [f64; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
        }
    }
}

impl From<Distortion> for [f64; 5] {
    fn from(d: Distortion) -> Self {
        [d.k1, d.k2, d.p1, d.p2, d.k3]
    }
}

impl Distortion {
    /// Coefficients measured on a typical smartphone main camera.
    pub fn smartphone() -> Self {
        Self::from([-0.2, 0.1, 0.0001, 0.0001, 0.05])
    }

    pub fn is_zero(&self) -> bool {
        <[f64; 5]>::from(*self).iter().all(|c| *c == 0.0)
    }

    /// Maps an ideal normalized coordinate to where the lens actually images it.
    pub fn apply(&self, n: &Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;

        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }
}

// =========================================================================
// == Camera Parameters ==
// =========================================================================

fn default_sensor_size() -> [f64; 2] {
    DEFAULT_SENSOR_SIZE_MM
}

/// Raw intrinsics, as read from a session file or a calibration routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CameraParameters {
    pub image_width: u32,
    pub image_height: u32,
    /// `(fx, fy)` in pixels.
    pub focal_length: [f64; 2],
    /// `(cx, cy)` in pixels.
    pub principal_point: [f64; 2],
    #[serde(default)]
    pub distortion: Distortion,
    #[serde(default = "default_sensor_size")]
    pub sensor_size_mm: [f64; 2],
}

impl CameraParameters {
    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(MeasurementError::InvalidCameraParameters(reason));

        if self.image_width == 0 || self.image_height == 0 {
            return invalid(format!(
                "image dimensions must be positive, got {}x{}",
                self.image_width, self.image_height
            ));
        }
        let [fx, fy] = self.focal_length;
        if !all_finite(&[fx, fy]) || fx <= 0.0 || fy <= 0.0 {
            return invalid(format!("focal lengths must be positive, got ({fx}, {fy})"));
        }
        if !all_finite(&self.principal_point) {
            return invalid("principal point must be finite".to_owned());
        }
        if !all_finite(&<[f64; 5]>::from(self.distortion)) {
            return invalid("distortion coefficients must be finite".to_owned());
        }
        let [sw, sh] = self.sensor_size_mm;
        if !all_finite(&[sw, sh]) || sw <= 0.0 || sh <= 0.0 {
            return invalid(format!("sensor size must be positive, got ({sw}, {sh}) mm"));
        }
        Ok(())
    }
}

// =========================================================================
// == Camera Model ==
// =========================================================================

/// An immutable, validated camera. Recalibration builds a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraModel {
    params: CameraParameters,
    /// The focal length was derived from an assumed field of view.
    estimated: bool,
}

impl CameraModel {
    pub fn new(params: CameraParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            estimated: false,
        })
    }

    /// A typical smartphone camera for the given resolution.
    ///
    /// Without a measured `focal_length_px` the focal length is derived from a
    /// 65 degree diagonal field of view. That is an approximation, reported by
    /// [`CameraModel::is_estimated`].
    pub fn create_default(width: u32, height: u32, focal_length_px: Option<f64>) -> Result<Self> {
        let measured = focal_length_px.filter(|f| f.is_finite() && *f > 0.0);
        let focal = match measured {
            Some(f) => f,
            None => {
                let diagonal = f64::from(width).hypot(f64::from(height));
                diagonal / (2.0 * (DEFAULT_DIAGONAL_FOV_DEG.to_radians() / 2.0).tan())
            }
        };

        let mut model = Self::new(CameraParameters {
            image_width: width,
            image_height: height,
            focal_length: [focal, focal],
            principal_point: [f64::from(width) / 2.0, f64::from(height) / 2.0],
            distortion: Distortion::smartphone(),
            sensor_size_mm: DEFAULT_SENSOR_SIZE_MM,
        })?;
        model.estimated = measured.is_none();
        Ok(model)
    }

    // --- Intrinsics ---

    pub fn parameters(&self) -> &CameraParameters {
        &self.params
    }

    pub fn is_estimated(&self) -> bool {
        self.estimated
    }

    pub fn image_size(&self) -> (u32, u32) {
        (self.params.image_width, self.params.image_height)
    }

    /// The intrinsic matrix `K`.
    pub fn camera_matrix(&self) -> Matrix3<f64> {
        let [fx, fy] = self.params.focal_length;
        let [cx, cy] = self.params.principal_point;
        Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0)
    }

    /// Sensor millimeters per pixel, `(x, y)`.
    pub fn pixel_pitch_mm(&self) -> (f64, f64) {
        let [sw, sh] = self.params.sensor_size_mm;
        (
            sw / f64::from(self.params.image_width),
            sh / f64::from(self.params.image_height),
        )
    }

    /// Focal lengths converted to millimeters through the pixel pitch.
    pub fn focal_length_mm(&self) -> (f64, f64) {
        let [fx, fy] = self.params.focal_length;
        let (px, py) = self.pixel_pitch_mm();
        (fx * px, fy * py)
    }

    /// Horizontal field of view in radians.
    pub fn horizontal_fov(&self) -> f64 {
        let (pitch, _) = self.pixel_pitch_mm();
        let (focal, _) = self.focal_length_mm();
        2.0 * (f64::from(self.params.image_width) * pitch / 2.0).atan2(focal)
    }

    pub fn vertical_fov(&self) -> f64 {
        let (_, pitch) = self.pixel_pitch_mm();
        let (_, focal) = self.focal_length_mm();
        2.0 * (f64::from(self.params.image_height) * pitch / 2.0).atan2(focal)
    }

    // --- Coordinate conversions ---

    fn to_normalized(&self, pixel: &Pixel) -> Vector2<f64> {
        let [fx, fy] = self.params.focal_length;
        let [cx, cy] = self.params.principal_point;
        Vector2::new((pixel.x - cx) / fx, (pixel.y - cy) / fy)
    }

    fn to_pixel(&self, n: &Vector2<f64>) -> Pixel {
        let [fx, fy] = self.params.focal_length;
        let [cx, cy] = self.params.principal_point;
        Pixel::new(n.x * fx + cx, n.y * fy + cy)
    }

    fn in_bounds(&self, pixel: &Pixel) -> bool {
        (0.0..=f64::from(self.params.image_width)).contains(&pixel.x)
            && (0.0..=f64::from(self.params.image_height)).contains(&pixel.y)
    }

    /// Inverts [`Distortion::apply`] by fixed-point iteration.
    fn undistort_normalized(&self, distorted: &Vector2<f64>) -> Vector2<f64> {
        let d = &self.params.distortion;
        if d.is_zero() {
            return *distorted;
        }

        let [fx, fy] = self.params.focal_length;
        let mut n = *distorted;
        for _ in 0..MAX_UNDISTORT_ITERATIONS {
            let residual = distorted - d.apply(&n);
            n += residual;
            let (ex, ey) = (residual.x * fx, residual.y * fy);
            if ex * ex + ey * ey < UNDISTORT_EPSILON {
                break;
            }
        }
        n
    }

    /// Removes lens distortion from an observed pixel.
    pub fn undistort_point(&self, pixel: &Pixel) -> Pixel {
        let n = self.undistort_normalized(&self.to_normalized(pixel));
        self.to_pixel(&n)
    }

    /// Where the lens images a pixel that an ideal pinhole would put at `pixel`.
    pub fn distort_point(&self, pixel: &Pixel) -> Pixel {
        let n = self.params.distortion.apply(&self.to_normalized(pixel));
        self.to_pixel(&n)
    }

    /// Projects a camera-frame point into the image.
    ///
    /// Returns `None` for points behind the camera (`Z <= 0`) and for points
    /// that land outside the image; both are ordinary outcomes.
    pub fn project_point(&self, point: &CameraPoint) -> Option<Pixel> {
        if point.z <= 0.0 {
            return None;
        }
        let ideal = Vector2::new(point.x / point.z, point.y / point.z);
        let pixel = self.to_pixel(&self.params.distortion.apply(&ideal));
        self.in_bounds(&pixel).then_some(pixel)
    }

    /// The point at `depth` along the ray through `pixel`.
    ///
    /// With `depth = 1.0` this is the ray direction on the unit-depth plane.
    pub fn unproject_point(&self, pixel: &Pixel, depth: f64) -> CameraPoint {
        let n = self.undistort_normalized(&self.to_normalized(pixel));
        CameraPoint::new(n.x * depth, n.y * depth, depth)
    }

    /// Metric distance between two pixels whose scene points lie on a
    /// fronto-parallel plane `plane_distance` meters away.
    pub fn calculate_real_distance(
        &self,
        p1: &Pixel,
        p2: &Pixel,
        plane_distance: f64,
    ) -> Result<f64> {
        if !plane_distance.is_finite() || plane_distance <= 0.0 {
            return Err(MeasurementError::MeasurementOutOfRange {
                value: plane_distance,
                min: f64::MIN_POSITIVE,
                max: f64::MAX,
            });
        }
        let a = self.unproject_point(p1, plane_distance);
        let b = self.unproject_point(p2, plane_distance);
        Ok(nalgebra::distance(&a, &b))
    }

    /// Distance to an object of known size spanning `pixel_size` pixels.
    ///
    /// Similar triangles: `distance / object_size = focal / image_extent`, with
    /// both the focal length and the object's extent on the sensor in mm.
    pub fn estimate_distance(&self, object_size_m: f64, pixel_size: f64) -> Result<f64> {
        for value in [object_size_m, pixel_size] {
            if !value.is_finite() || value <= 0.0 {
                return Err(MeasurementError::MeasurementOutOfRange {
                    value,
                    min: f64::MIN_POSITIVE,
                    max: f64::MAX,
                });
            }
        }
        let (pitch, _) = self.pixel_pitch_mm();
        let (focal_mm, _) = self.focal_length_mm();
        let extent_mm = pixel_size * pitch;
        Ok(object_size_m * focal_mm / extent_mm)
    }
}
