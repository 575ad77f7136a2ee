// caliper_core/src/lib.rs

// Pure computation: no I/O, no threads of its own.
pub mod config;
pub mod error;
pub mod estimation;
pub mod linalg;
pub mod measurement;
pub mod models;
pub mod prelude;
pub mod types;
