//! Replays recorded hardware signal traces through the co-simulation engine.

use env_logger as _;
#[cfg(test)]
use tempfile as _;

/// Cycle loop and outcome reporting.
pub mod runner;
/// JSON scenario format.
pub mod scenario;
