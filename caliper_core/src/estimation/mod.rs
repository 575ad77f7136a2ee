// caliper_core/src/estimation/mod.rs

//! Recursive estimation: the linear Kalman filter and the sensor-fusion
//! pipeline built from one filter per physical sensor.

pub mod fusion;
pub mod kalman;
