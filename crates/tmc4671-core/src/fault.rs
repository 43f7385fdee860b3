use thiserror::Error;

use crate::encoding::{ADDRESS_BITS, WORD_BITS};

/// Fault classes used for diagnostics aggregation and harness reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Select or clock framing contract broken.
    Framing,
    /// Required quiescent interval or clock activity not observed.
    Timing,
    /// Address not present in the seeded register file.
    Lookup,
    /// Change hook could not recompute its dependents.
    Hook,
    /// Malformed request rejected before any bus activity.
    InvalidArgument,
}

impl FaultClass {
    /// Number of fault classes, used to size per-class counters.
    pub const COUNT: usize = 5;

    /// Ordered list of all fault classes.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Framing,
        Self::Timing,
        Self::Lookup,
        Self::Hook,
        Self::InvalidArgument,
    ];

    /// Returns the counter index for this class.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short lowercase name used in scenario files and CLI output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Framing => "framing",
            Self::Timing => "timing",
            Self::Lookup => "lookup",
            Self::Hook => "hook",
            Self::InvalidArgument => "invalid-argument",
        }
    }

    /// Parses the short name produced by [`FaultClass::name`].
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.name() == name)
    }
}

/// Protocol phase a transaction was in when a fault was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Phase {
    /// First bit of the frame.
    Direction,
    /// Register address field.
    Address,
    /// Boundary between the address and data fields.
    Boundary,
    /// Quiescent interval a read requires before its data field.
    Pause,
    /// Register content field.
    Data,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Direction => "direction",
            Self::Address => "address",
            Self::Boundary => "address/data boundary",
            Self::Pause => "read pause",
            Self::Data => "data",
        };
        f.write_str(name)
    }
}

/// Register file access failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum RegisterError {
    /// Address was never seeded.
    #[error("register 0x{0:02X} is not present in the register file")]
    UnknownAddress(u8),
    /// Address does not fit the protocol address field.
    #[error("register address 0x{0:02X} exceeds the {bits}-bit address field", bits = ADDRESS_BITS)]
    AddressOutOfRange(u8),
}

/// Change-hook evaluation failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum HookError {
    /// Recompute function is not defined for the written value.
    #[error("hook on register 0x{watch:02X} is undefined for value 0x{value:08X}")]
    OutOfDomain {
        /// Watch address that was written.
        watch: u8,
        /// Value written to the watch address.
        value: u32,
    },
    /// Recompute function returned the wrong number of values.
    #[error("hook on register 0x{watch:02X} returned {actual} values for {expected} dependents")]
    ArityMismatch {
        /// Watch address that was written.
        watch: u8,
        /// Number of declared dependent addresses.
        expected: usize,
        /// Number of values the function returned.
        actual: usize,
    },
    /// A dependent address is missing from the register file.
    #[error("hook on register 0x{watch:02X} targets a missing register: {source}")]
    Register {
        /// Watch address that was written.
        watch: u8,
        /// Underlying lookup failure.
        source: RegisterError,
    },
}

/// Stimulus word construction failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum EncodeError {
    /// Direction text was neither `read` nor `write`.
    #[error("expected operation to be one of [read, write], got '{0}'")]
    InvalidDirection(String),
    /// Address is not seeded in the register file.
    #[error("expected address to be one of {known:02X?}, got 0x{address:02X}")]
    UnknownAddress {
        /// Rejected address.
        address: u8,
        /// Seeded addresses in ascending order.
        known: Vec<u8>,
    },
}

/// Slave construction rejected before any bus activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ConfigError {
    /// Configured word width disagrees with the fixed word layout.
    #[error("word width {0} does not match the {bits}-bit word layout", bits = WORD_BITS)]
    WordWidthMismatch(u32),
    /// Only MSB-first framing is implemented.
    #[error("lsb-first bit order is not supported")]
    LsbFirstUnsupported,
    /// Seed register set could not be built.
    #[error("invalid register seed: {0}")]
    Seed(#[from] RegisterError),
}

/// Reasons a single frame failed to decode or commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum TransactionError {
    /// Clock was not idle when select asserted.
    #[error("sclk should be idle at the chip select assert edge")]
    ClockNotIdleAtSelect,
    /// Select deasserted before the frame was complete.
    #[error("chip select deasserted in the middle of the {phase} phase")]
    SelectDeasserted {
        /// Phase the frame was aborted in.
        phase: Phase,
    },
    /// Clock was not idle when select deasserted.
    #[error("sclk should be idle at the chip select deassert edge")]
    ClockNotIdleAtDeselect,
    /// More clock edges arrived than the word width allows.
    #[error("sampled more than {word_bits} bits in one frame")]
    Overrun {
        /// Protocol word width.
        word_bits: u32,
    },
    /// Data phase of a read started before the quiescent interval elapsed.
    #[error("read access requires a {required_ns} ns pause after the address field")]
    ReadPauseViolated {
        /// Enforced minimum pause.
        required_ns: u64,
    },
    /// No clock edge arrived within the stall timeout.
    #[error("sclk stalled for {timeout_ns} ns during the {phase} phase")]
    ClockStalled {
        /// Phase the clock stalled in.
        phase: Phase,
        /// Configured stall timeout.
        timeout_ns: u64,
    },
    /// Addressed register does not exist.
    #[error(transparent)]
    Register(#[from] RegisterError),
    /// Change hook failed during commit.
    #[error(transparent)]
    Hook(#[from] HookError),
}

impl RegisterError {
    /// Returns the diagnostics fault class for this error.
    #[must_use]
    pub const fn class(self) -> FaultClass {
        FaultClass::Lookup
    }
}

impl HookError {
    /// Returns the diagnostics fault class for this error.
    #[must_use]
    pub const fn class(&self) -> FaultClass {
        FaultClass::Hook
    }
}

impl EncodeError {
    /// Returns the diagnostics fault class for this error.
    #[must_use]
    pub const fn class(&self) -> FaultClass {
        FaultClass::InvalidArgument
    }
}

impl ConfigError {
    /// Returns the diagnostics fault class for this error.
    #[must_use]
    pub const fn class(&self) -> FaultClass {
        FaultClass::InvalidArgument
    }
}

impl TransactionError {
    /// Returns the diagnostics fault class for this error.
    #[must_use]
    pub const fn class(&self) -> FaultClass {
        match self {
            Self::ClockNotIdleAtSelect
            | Self::SelectDeasserted { .. }
            | Self::ClockNotIdleAtDeselect
            | Self::Overrun { .. } => FaultClass::Framing,
            Self::ReadPauseViolated { .. } | Self::ClockStalled { .. } => FaultClass::Timing,
            Self::Register(_) => FaultClass::Lookup,
            Self::Hook(_) => FaultClass::Hook,
        }
    }
}
