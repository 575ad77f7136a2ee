// caliper_core/src/measurement/mod.rs

//! Points in, measurements out.
//!
//! [`engine::MeasurementEngine`] owns calibration and the result cache and is
//! the only place results are produced. The other modules are the value
//! types and pure helpers it is built from.

pub mod cache;
pub mod confidence;
pub mod engine;
pub mod point;
pub mod reference;
pub mod result;
pub mod units;
