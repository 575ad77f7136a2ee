// caliper_core/src/models/dynamics/mod.rs

use crate::linalg::Matrix;
use dyn_clone::DynClone;
use std::fmt::Debug;

// --- TRANSITION MODEL TRAIT ---
// Describes how a linear filter's state evolves between samples: `x_k+1 = F(dt) * x_k`.
/// A (possibly time-varying) linear state transition.
///
/// Filters consult the model on every `predict` with a positive `dt`. Models
/// whose transition does not depend on time return `None`, in which case the
/// filter keeps whatever `F` was configured on it.
pub trait TransitionModel: DynClone + Debug + Send + Sync {
    /// Length of the state vector this model is written for.
    fn state_dim(&self) -> usize;

    /// Builds `F` for a step of `dt` seconds, or `None` to keep the current `F`.
    fn transition_matrix(&self, dt: f64) -> Option<Matrix>;
}

// This macro automatically generates the implementation of `Clone` for `Box<dyn TransitionModel>`.
dyn_clone::clone_trait_object!(TransitionModel);

pub mod generic;
