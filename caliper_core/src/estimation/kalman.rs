// caliper_core/src/estimation/kalman.rs

use log::{debug, trace};

use crate::error::{MeasurementError, Result};
use crate::linalg::{self, ensure_shape, Matrix};
use crate::models::dynamics::generic::StaticModel;
use crate::models::dynamics::TransitionModel;

/// Default process noise scale, `Q = 1e-4 * I`.
pub const DEFAULT_PROCESS_NOISE: f64 = 1e-4;
/// Default measurement noise scale, `R = 1e-2 * I`.
pub const DEFAULT_MEASUREMENT_NOISE: f64 = 1e-2;

/// A discrete linear Kalman filter with fixed dimensions.
///
/// * `n` - state dimension
/// * `m` - measurement dimension
/// * `c` - control dimension (0 when the filter takes no control input)
///
/// Every setter and every `predict`/`update` input is shape-checked against
/// these dimensions; a mismatch is reported as
/// [`MeasurementError::DimensionMismatch`] and leaves the filter untouched.
///
/// The filter mutates in place and is meant to be driven by a single
/// producer (one instance per sensor axis-group).
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    state_dim: usize,
    measurement_dim: usize,
    control_dim: usize,

    /// The state estimate `x` (n x 1).
    state: Matrix,
    /// The error covariance `P` (n x n).
    covariance: Matrix,
    /// The state transition `F` (n x n).
    transition: Matrix,
    /// The control matrix `B` (n x c), present only when `c > 0`.
    control_matrix: Option<Matrix>,
    /// The measurement matrix `H` (m x n).
    measurement_matrix: Matrix,
    /// The process noise covariance `Q` (n x n).
    process_noise: Matrix,
    /// The measurement noise covariance `R` (m x m).
    measurement_noise: Matrix,

    /// Rebuilds `F` from `dt` for time-varying models.
    model: Box<dyn TransitionModel>,
    /// Residual `y = z - Hx` of the most recent successful update.
    last_innovation: Option<Matrix>,
}

impl KalmanFilter {
    /// Creates a filter with zero state, identity covariance, identity `F`,
    /// zero `H` and the default noise levels.
    pub fn new(state_dim: usize, measurement_dim: usize, control_dim: usize) -> Result<Self> {
        if state_dim == 0 || measurement_dim == 0 {
            return Err(MeasurementError::DimensionMismatch {
                context: "KalmanFilter::new",
                expected: (1, 1),
                actual: (state_dim, measurement_dim),
            });
        }

        Ok(Self {
            state_dim,
            measurement_dim,
            control_dim,
            state: Matrix::zeros(state_dim, 1),
            covariance: linalg::identity(state_dim),
            transition: linalg::identity(state_dim),
            control_matrix: (control_dim > 0).then(|| Matrix::zeros(state_dim, control_dim)),
            measurement_matrix: Matrix::zeros(measurement_dim, state_dim),
            process_noise: linalg::identity(state_dim) * DEFAULT_PROCESS_NOISE,
            measurement_noise: linalg::identity(measurement_dim) * DEFAULT_MEASUREMENT_NOISE,
            model: Box::new(StaticModel::new(state_dim)),
            last_innovation: None,
        })
    }

    /// A direct-observation smoother: `F = I`, `H = I`, `Q = q*I`, `R = r*I`.
    ///
    /// This is the configuration used to denoise raw vector sensors, where
    /// every state component is measured directly.
    pub fn smoother(dim: usize, process_noise: f64, measurement_noise: f64) -> Result<Self> {
        let mut filter = Self::new(dim, dim, 0)?;
        filter.measurement_matrix = linalg::identity(dim);
        filter.process_noise = linalg::identity(dim) * process_noise;
        filter.measurement_noise = linalg::identity(dim) * measurement_noise;
        Ok(filter)
    }

    /// Replaces the transition model. Its state dimension must match the filter's.
    pub fn with_model(mut self, model: Box<dyn TransitionModel>) -> Result<Self> {
        if model.state_dim() != self.state_dim {
            return Err(MeasurementError::DimensionMismatch {
                context: "KalmanFilter::with_model",
                expected: (self.state_dim, self.state_dim),
                actual: (model.state_dim(), model.state_dim()),
            });
        }
        self.model = model;
        Ok(self)
    }

    // --- The Predict/Update Cycle ---

    /// Advances the estimate by one step.
    ///
    /// `x <- F x (+ B u)`, `P <- F P F^T + Q`. When `dt > 0` and the transition
    /// model is time-varying, `F` is rebuilt from `dt` first.
    pub fn predict(&mut self, control: Option<&Matrix>, dt: f64) -> Result<()> {
        let control_term = match control {
            Some(u) => {
                ensure_shape("predict control", u, (self.control_dim, 1))?;
                match &self.control_matrix {
                    Some(b) => Some(b * u),
                    None => {
                        return Err(MeasurementError::DimensionMismatch {
                            context: "predict control",
                            expected: (0, 1),
                            actual: u.shape(),
                        })
                    }
                }
            }
            None => None,
        };

        if dt > 0.0 {
            if let Some(f) = self.model.transition_matrix(dt) {
                ensure_shape("transition model", &f, (self.state_dim, self.state_dim))?;
                self.transition = f;
            }
        }

        let f = &self.transition;
        let mut x_pred = f * &self.state;
        if let Some(bu) = control_term {
            x_pred += bu;
        }
        let p_pred = f * &self.covariance * f.transpose() + &self.process_noise;

        self.state = x_pred;
        self.covariance = p_pred;
        Ok(())
    }

    /// Fuses a measurement `z` (m x 1) into the estimate.
    ///
    /// `measurement_noise` overrides `R` for this call only, for sensors whose
    /// noise varies sample to sample. A singular innovation covariance is
    /// reported as [`MeasurementError::Processing`] and the estimate is left
    /// as it was.
    pub fn update(
        &mut self,
        measurement: &Matrix,
        measurement_noise: Option<&Matrix>,
    ) -> Result<()> {
        ensure_shape("update measurement", measurement, (self.measurement_dim, 1))?;
        let r = match measurement_noise {
            Some(r) => {
                ensure_shape(
                    "update measurement noise",
                    r,
                    (self.measurement_dim, self.measurement_dim),
                )?;
                r
            }
            None => &self.measurement_noise,
        };

        let h = &self.measurement_matrix;
        let p = &self.covariance;

        // 1. Residual: y = z - H x
        let y = measurement - h * &self.state;
        // 2. Innovation covariance: S = H P H^T + R
        let s = h * p * h.transpose() + r;
        // 3. Gain: K = P H^T S^-1
        let s_inv = linalg::invert(&s)?;
        let k = p * h.transpose() * s_inv;

        // 4. Commit: x <- x + K y, P <- (I - K H) P
        let eye = linalg::identity(self.state_dim);
        self.state += &k * &y;
        self.covariance = (eye - &k * h) * p;

        trace!("kalman update: innovation norm {:.6}", y.norm());
        self.last_innovation = Some(y);
        Ok(())
    }

    /// Reinitializes state and covariance, keeping `F`, `B`, `H`, `Q` and `R`.
    ///
    /// The covariance falls back to identity when none is given.
    pub fn reset(
        &mut self,
        initial_state: &Matrix,
        initial_covariance: Option<&Matrix>,
    ) -> Result<()> {
        ensure_shape("reset state", initial_state, (self.state_dim, 1))?;
        let covariance = match initial_covariance {
            Some(p) => {
                ensure_shape("reset covariance", p, (self.state_dim, self.state_dim))?;
                p.clone()
            }
            None => linalg::identity(self.state_dim),
        };

        self.state = initial_state.clone();
        self.covariance = covariance;
        self.last_innovation = None;
        debug!("kalman filter reset (n = {})", self.state_dim);
        Ok(())
    }

    // --- Accessors ---

    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    pub fn measurement_dim(&self) -> usize {
        self.measurement_dim
    }

    pub fn control_dim(&self) -> usize {
        self.control_dim
    }

    pub fn state(&self) -> &Matrix {
        &self.state
    }

    /// The state as a flat vector, convenient for 3-axis sensors.
    pub fn state_values(&self) -> Vec<f64> {
        self.state.iter().copied().collect()
    }

    pub fn covariance(&self) -> &Matrix {
        &self.covariance
    }

    pub fn transition(&self) -> &Matrix {
        &self.transition
    }

    pub fn control_matrix(&self) -> Option<&Matrix> {
        self.control_matrix.as_ref()
    }

    pub fn measurement_matrix(&self) -> &Matrix {
        &self.measurement_matrix
    }

    pub fn process_noise(&self) -> &Matrix {
        &self.process_noise
    }

    pub fn measurement_noise(&self) -> &Matrix {
        &self.measurement_noise
    }

    pub fn last_innovation(&self) -> Option<&Matrix> {
        self.last_innovation.as_ref()
    }

    pub fn set_state(&mut self, state: Matrix) -> Result<()> {
        ensure_shape("set_state", &state, (self.state_dim, 1))?;
        self.state = state;
        Ok(())
    }

    pub fn set_covariance(&mut self, covariance: Matrix) -> Result<()> {
        ensure_shape("set_covariance", &covariance, (self.state_dim, self.state_dim))?;
        self.covariance = covariance;
        Ok(())
    }

    pub fn set_transition(&mut self, transition: Matrix) -> Result<()> {
        ensure_shape("set_transition", &transition, (self.state_dim, self.state_dim))?;
        self.transition = transition;
        Ok(())
    }

    pub fn set_control_matrix(&mut self, control_matrix: Matrix) -> Result<()> {
        if self.control_dim == 0 {
            return Err(MeasurementError::DimensionMismatch {
                context: "set_control_matrix",
                expected: (self.state_dim, 0),
                actual: control_matrix.shape(),
            });
        }
        ensure_shape(
            "set_control_matrix",
            &control_matrix,
            (self.state_dim, self.control_dim),
        )?;
        self.control_matrix = Some(control_matrix);
        Ok(())
    }

    pub fn set_measurement_matrix(&mut self, measurement_matrix: Matrix) -> Result<()> {
        ensure_shape(
            "set_measurement_matrix",
            &measurement_matrix,
            (self.measurement_dim, self.state_dim),
        )?;
        self.measurement_matrix = measurement_matrix;
        Ok(())
    }

    pub fn set_process_noise(&mut self, process_noise: Matrix) -> Result<()> {
        ensure_shape("set_process_noise", &process_noise, (self.state_dim, self.state_dim))?;
        self.process_noise = process_noise;
        Ok(())
    }

    pub fn set_measurement_noise(&mut self, measurement_noise: Matrix) -> Result<()> {
        ensure_shape(
            "set_measurement_noise",
            &measurement_noise,
            (self.measurement_dim, self.measurement_dim),
        )?;
        self.measurement_noise = measurement_noise;
        Ok(())
    }
}
