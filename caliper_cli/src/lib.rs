// caliper_cli/src/lib.rs

// Command-line front-end: session loading, replay and reporting. All
// measurement logic lives in `caliper_core`.
pub mod cli;
pub mod report;
pub mod session;
