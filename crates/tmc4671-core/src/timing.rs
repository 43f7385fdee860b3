/// Fixed delays and intervals the slave enforces or observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelayKind {
    /// Settle time between the shifting clock edge and the data sample point.
    GuardDelay,
    /// Minimum quiescent interval between address and data phase of a read.
    ReadPause,
    /// Minimum spacing between two consecutive frames.
    FrameSpacing,
    /// Read pause recommended by the datasheet, honoured by the stimulus master.
    DatasheetReadPause,
}

/// Single source-of-truth table of protocol delays in nanoseconds.
pub const DELAY_TABLE_NS: &[(DelayKind, u64)] = &[
    (DelayKind::GuardDelay, 20),
    (DelayKind::ReadPause, 250),
    (DelayKind::FrameSpacing, 6),
    (DelayKind::DatasheetReadPause, 500),
];

/// Looks up the delay in nanoseconds for a delay kind.
#[must_use]
pub fn delay_ns(kind: DelayKind) -> Option<u64> {
    DELAY_TABLE_NS
        .iter()
        .find_map(|(entry_kind, ns)| (*entry_kind == kind).then_some(*ns))
}

/// Timing thresholds used by the transaction state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DeviceTiming {
    /// Delay after each shifting edge before data-in is sampled.
    pub guard_ns: u64,
    /// Minimum pause after the address field of a read.
    pub read_pause_ns: u64,
    /// Fails a frame when no clock edge arrives for this long; disabled when `None`.
    pub stall_timeout_ns: Option<u64>,
}

impl Default for DeviceTiming {
    fn default() -> Self {
        Self {
            guard_ns: delay_ns(DelayKind::GuardDelay).unwrap_or(20),
            read_pause_ns: delay_ns(DelayKind::ReadPause).unwrap_or(250),
            stall_timeout_ns: None,
        }
    }
}

impl DeviceTiming {
    /// Enables the stalled-clock check.
    #[must_use]
    pub const fn with_stall_timeout(mut self, timeout_ns: u64) -> Self {
        self.stall_timeout_ns = Some(timeout_ns);
        self
    }
}
