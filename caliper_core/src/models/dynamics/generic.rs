// caliper_core/src/models/dynamics/generic.rs

use crate::linalg::Matrix;
use crate::models::dynamics::TransitionModel;

// --- Static Model ---
// The no-motion assumption: the quantity being filtered stays put between
// samples and only the process noise lets it drift.
#[derive(Debug, Clone)]
pub struct StaticModel {
    pub dim: usize,
}

impl StaticModel {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl TransitionModel for StaticModel {
    fn state_dim(&self) -> usize {
        self.dim
    }

    fn transition_matrix(&self, _dt: f64) -> Option<Matrix> {
        None
    }
}

// --- Constant Velocity Model ---
// State layout per axis block: [p_0..p_k, v_0..v_k].
#[derive(Debug, Clone)]
pub struct ConstantVelocityModel {
    /// Number of independent axes (3 for a vector sensor).
    pub axes: usize,
}

impl TransitionModel for ConstantVelocityModel {
    fn state_dim(&self) -> usize {
        2 * self.axes
    }

    fn transition_matrix(&self, dt: f64) -> Option<Matrix> {
        let k = self.axes;
        let mut f = Matrix::identity(2 * k, 2 * k);
        for i in 0..k {
            // d(p)/dt = v
            f[(i, k + i)] = dt;
        }
        Some(f)
    }
}

// --- Constant Acceleration Model ---
// Assumes the quantity continues to move with a slowly changing acceleration.
// State layout: [p_0..p_k, v_0..v_k, a_0..a_k].
#[derive(Debug, Clone)]
pub struct ConstantAccelerationModel {
    pub axes: usize,
}

impl TransitionModel for ConstantAccelerationModel {
    fn state_dim(&self) -> usize {
        3 * self.axes
    }

    fn transition_matrix(&self, dt: f64) -> Option<Matrix> {
        let k = self.axes;
        let mut f = Matrix::identity(3 * k, 3 * k);
        for i in 0..k {
            // p += v*dt + a*dt^2/2
            f[(i, k + i)] = dt;
            f[(i, 2 * k + i)] = 0.5 * dt * dt;
            // v += a*dt
            f[(k + i, 2 * k + i)] = dt;
            // a is constant; Q models its drift.
        }
        Some(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_model_keeps_configured_transition() {
        assert!(StaticModel::new(3).transition_matrix(0.1).is_none());
    }

    #[test]
    fn constant_velocity_couples_position_to_velocity() {
        let model = ConstantVelocityModel { axes: 2 };
        let f = model.transition_matrix(0.5).unwrap();
        assert_eq!(f.shape(), (4, 4));
        assert_eq!(f[(0, 2)], 0.5);
        assert_eq!(f[(1, 3)], 0.5);
        assert_eq!(f[(2, 0)], 0.0);
        assert_eq!(f[(3, 3)], 1.0);
    }

    #[test]
    fn constant_acceleration_has_quadratic_term() {
        let model = ConstantAccelerationModel { axes: 1 };
        let f = model.transition_matrix(2.0).unwrap();
        assert_eq!(f.shape(), (3, 3));
        assert_eq!(f[(0, 1)], 2.0);
        assert_eq!(f[(0, 2)], 2.0);
        assert_eq!(f[(1, 2)], 2.0);
        assert_eq!(f[(2, 2)], 1.0);
    }
}
