//! Scenario runner for the TMC4671 SPI slave emulation.

use env_logger as _;

/// Scenario file syntax.
pub mod scenario;
/// Scenario execution on the simulated bus.
pub mod runner;

#[cfg(test)]
use tempfile as _;
