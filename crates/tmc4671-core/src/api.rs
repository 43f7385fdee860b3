//! Bus-facing contracts between the slave core and the event substrate.
//!
//! The transaction state machine only sees the [`SpiBus`] trait: a race over
//! [`Trigger`]s plus line reads and the data-out drive. The simulation kernel
//! in [`crate::sim`] is one implementation; any other event-driven substrate
//! can be plugged in.

use std::future::Future;

use crate::encoding::WORD_BITS;
use crate::fault::ConfigError;
use crate::timing::{delay_ns, DelayKind};

/// Default nominal clock period used by the stimulus master.
pub const DEFAULT_SCLK_PERIOD_NS: u64 = 100;

/// Signals of the SPI bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Line {
    /// Serial clock, driven by the master.
    Sclk,
    /// Data-in of the slave, driven by the master.
    Mosi,
    /// Data-out of the slave.
    Miso,
    /// Chip select, driven by the master.
    Cs,
}

impl Line {
    /// Number of lines in the bundle.
    pub const COUNT: usize = 4;

    /// Returns the array index for this line.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Level transition direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Edge {
    /// Low-to-high transition.
    Rising,
    /// High-to-low transition.
    Falling,
}

impl Edge {
    /// Classifies a level change, or `None` when the level did not change.
    #[must_use]
    pub const fn between(old: bool, new: bool) -> Option<Self> {
        match (old, new) {
            (false, true) => Some(Self::Rising),
            (true, false) => Some(Self::Falling),
            _ => None,
        }
    }
}

/// Awaitable condition raced by the slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Trigger {
    /// Fires on the next matching edge of a line.
    Edge {
        /// Observed line.
        line: Line,
        /// Edge direction.
        edge: Edge,
    },
    /// Fires once the given number of nanoseconds has elapsed.
    Timer(u64),
}

impl Trigger {
    /// Next rising edge of `line`.
    #[must_use]
    pub const fn rising(line: Line) -> Self {
        Self::Edge {
            line,
            edge: Edge::Rising,
        }
    }

    /// Next falling edge of `line`.
    #[must_use]
    pub const fn falling(line: Line) -> Self {
        Self::Edge {
            line,
            edge: Edge::Falling,
        }
    }

    /// Timer of `ns` nanoseconds.
    #[must_use]
    pub const fn timer(ns: u64) -> Self {
        Self::Timer(ns)
    }
}

/// Select-assert and select-deassert triggers bounding one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    /// Resolves when chip select asserts.
    pub start: Trigger,
    /// Resolves when chip select deasserts.
    pub end: Trigger,
}

impl Frame {
    /// Frame triggers for a chip select of the given polarity.
    #[must_use]
    pub const fn for_select(active_low: bool) -> Self {
        if active_low {
            Self {
                start: Trigger::falling(Line::Cs),
                end: Trigger::rising(Line::Cs),
            }
        } else {
            Self {
                start: Trigger::rising(Line::Cs),
                end: Trigger::falling(Line::Cs),
            }
        }
    }
}

/// Static bus timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SpiConfig {
    /// Bits per frame.
    pub word_width: u32,
    /// Nominal clock period used when generating stimulus.
    pub sclk_period_ns: u64,
    /// Clock idle level (`true` = idle high).
    pub cpol: bool,
    /// Clock phase as declared by the device configuration.
    pub cpha: bool,
    /// Bit order on the wire.
    pub msb_first: bool,
    /// Minimum spacing between consecutive frames.
    pub frame_spacing_ns: u64,
    /// Chip select polarity.
    pub cs_active_low: bool,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            word_width: WORD_BITS,
            sclk_period_ns: DEFAULT_SCLK_PERIOD_NS,
            cpol: true,
            cpha: false,
            msb_first: true,
            frame_spacing_ns: delay_ns(DelayKind::FrameSpacing).unwrap_or(6),
            cs_active_low: true,
        }
    }
}

impl SpiConfig {
    /// Clock level between frames.
    #[must_use]
    pub const fn clock_idle_level(&self) -> bool {
        self.cpol
    }

    /// First clock edge of each bit, on which the master shifts data out.
    #[must_use]
    pub const fn shift_edge(&self) -> Edge {
        if self.cpol {
            Edge::Falling
        } else {
            Edge::Rising
        }
    }

    /// Second clock edge of each bit, on which the master samples data-out.
    #[must_use]
    pub const fn sample_edge(&self) -> Edge {
        match self.shift_edge() {
            Edge::Falling => Edge::Rising,
            Edge::Rising => Edge::Falling,
        }
    }

    /// Chip select level while a frame is active.
    #[must_use]
    pub const fn select_active_level(&self) -> bool {
        !self.cs_active_low
    }

    /// Frame triggers for this configuration.
    #[must_use]
    pub const fn frame(&self) -> Frame {
        Frame::for_select(self.cs_active_low)
    }

    /// Checks the configuration against the fixed word layout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WordWidthMismatch`] for any width other than the
    /// 40-bit layout and [`ConfigError::LsbFirstUnsupported`] for LSB-first
    /// framing.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.word_width != WORD_BITS {
            return Err(ConfigError::WordWidthMismatch(self.word_width));
        }
        if !self.msb_first {
            return Err(ConfigError::LsbFirstUnsupported);
        }
        Ok(())
    }
}

/// Event substrate contract consumed by the transaction state machine.
pub trait SpiBus {
    /// Resolves with whichever trigger fires first.
    ///
    /// When several triggers fire in the same step, the one listed first wins.
    /// Losing triggers are dropped without side effects.
    fn race(&self, triggers: &[Trigger]) -> impl Future<Output = Trigger>;

    /// Current level of `line`.
    fn level(&self, line: Line) -> bool;

    /// Drives `line` to `level`; the slave only ever drives [`Line::Miso`].
    fn drive(&self, line: Line, level: bool);
}
