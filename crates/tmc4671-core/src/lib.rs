//! Signal-level SPI slave emulation of the TMC4671 register interface.
//!
//! The slave decodes 40-bit frames bit by bit from the bus lines, keeps a
//! register file, and recomputes dependent registers through change hooks.
//! A deterministic discrete-event kernel and a bit-banging master are bundled
//! for tests and scenario runs.
#![allow(clippy::future_not_send)]

/// Fault taxonomy and error types.
pub mod fault;
pub use fault::{
    ConfigError, EncodeError, FaultClass, HookError, Phase, RegisterError, TransactionError,
};

/// Fixed protocol word layout and stimulus-word encoder.
pub mod encoding;
pub use encoding::{
    decode, encode, Direction, SpiWord, ADDRESS_BITS, ADDRESS_MASK, CONTENT_BITS, DIRECTION_BIT,
    WORD_BITS, WORD_MASK,
};

/// Sparse register file.
pub mod registers;
pub use registers::RegisterFile;

/// Change-hook registry.
pub mod hooks;
pub use hooks::{ChangeHook, HookRegistry, RecomputeFn};

/// Protocol delay table and slave timing thresholds.
pub mod timing;
pub use timing::{delay_ns, DelayKind, DeviceTiming, DELAY_TABLE_NS};

/// Bus contracts consumed by the state machine.
pub mod api;
pub use api::{Edge, Frame, Line, SpiBus, SpiConfig, Trigger, DEFAULT_SCLK_PERIOD_NS};

/// Discrete-event simulation kernel and idle gate.
pub mod sim;
pub use sim::{IdleGate, SimHandle, SimTime, Simulator};

/// Transaction state machine.
pub mod transaction;
pub use transaction::Transaction;

/// Slave device and frame dispatcher.
pub mod device;
pub use device::SpiSlave;

/// Diagnostics counters and transaction history.
pub mod diag;
pub use diag::{DiagCounters, TransactionHistory, TransactionRecord, HISTORY_CAPACITY};

/// TMC4671 bootstrap.
pub mod tmc4671;
pub use tmc4671::{chipinfo_data, Tmc4671, CHIPINFO_ADDR, CHIPINFO_DATA, CHIPINFO_TABLE, CHIP_TYPE};

/// Stimulus master for the simulated bus.
pub mod master;
pub use master::{FaultInjection, MasterTiming, SpiMaster, Transfer};

#[cfg(test)]
use proptest as _;
