//! Discrete-event simulation substrate for the SPI bundle.

/// Readiness gate shared between the dispatch loop and register readers.
pub mod gate;
/// Executor, time base and trigger races.
pub mod kernel;

pub use gate::{IdleGate, IdleWait};
pub use kernel::{Race, SimHandle, SimTime, Simulator};
