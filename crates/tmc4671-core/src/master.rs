//! Stimulus master that clocks 40-bit frames onto the simulated bus.
//!
//! Data is driven together with each shifting edge and `miso` is captured
//! just before the following sampling edge, so the slave's guard delay always
//! falls inside the first half of the bit period.

use crate::api::{Line, SpiConfig};
use crate::encoding::{Direction, SpiWord, ADDRESS_BITS, WORD_BITS};
use crate::sim::SimHandle;
use crate::timing::{delay_ns, DelayKind};

/// Master-side timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MasterTiming {
    /// Time between consecutive clock edges.
    pub half_period_ns: u64,
    /// Gap between the last address edge and the first data edge of a read.
    pub read_pause_ns: u64,
    /// Delay from select assertion to the first clock edge.
    pub select_setup_ns: u64,
    /// Idle time after select deassertion.
    pub frame_spacing_ns: u64,
}

impl MasterTiming {
    /// Timing derived from the bus configuration, honouring the datasheet read pause.
    #[must_use]
    pub fn from_config(config: &SpiConfig) -> Self {
        let half_period_ns = (config.sclk_period_ns / 2).max(1);
        Self {
            half_period_ns,
            read_pause_ns: delay_ns(DelayKind::DatasheetReadPause).unwrap_or(500),
            select_setup_ns: half_period_ns,
            frame_spacing_ns: config.frame_spacing_ns,
        }
    }

    /// Overrides the read pause.
    #[must_use]
    pub const fn with_read_pause(mut self, read_pause_ns: u64) -> Self {
        self.read_pause_ns = read_pause_ns;
        self
    }
}

/// Deliberate protocol breakage for negative tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FaultInjection {
    /// Deasserts select after this many bits.
    pub abort_after_bits: Option<u32>,
    /// Clock pulses appended after the last word bit.
    pub extra_clocks: u32,
    /// Moves the clock off its idle level before select asserts.
    pub clock_active_at_select: bool,
    /// Leaves the clock off its idle level when select deasserts.
    pub clock_active_at_deselect: bool,
}

impl FaultInjection {
    /// No injected faults.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            abort_after_bits: None,
            extra_clocks: 0,
            clock_active_at_select: false,
            clock_active_at_deselect: false,
        }
    }

    /// Returns `true` when no fault is injected.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.abort_after_bits.is_none()
            && self.extra_clocks == 0
            && !self.clock_active_at_select
            && !self.clock_active_at_deselect
    }
}

/// Result of one clocked frame as seen by the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transfer {
    /// Word that was driven on `mosi`.
    pub sent: u64,
    /// Bits captured from `miso`, MSB first, left-aligned to the word width.
    pub received: u64,
    /// Clock pulses actually generated.
    pub bits_clocked: u32,
}

impl Transfer {
    /// Content field of the reply.
    #[must_use]
    pub const fn reply(&self) -> u32 {
        SpiWord::from_bits(self.received).content
    }

    /// Returns `true` when the slave echoed the direction and address bits.
    #[must_use]
    pub const fn header_echoed(&self) -> bool {
        let header_shift = WORD_BITS - 1 - ADDRESS_BITS;
        (self.sent >> header_shift) == (self.received >> header_shift)
    }
}

/// Bit-banging SPI master bound to a simulator handle.
#[derive(Debug, Clone)]
pub struct SpiMaster {
    bus: SimHandle,
    config: SpiConfig,
    timing: MasterTiming,
}

impl SpiMaster {
    /// Creates a master using [`MasterTiming::from_config`].
    #[must_use]
    pub fn new(bus: SimHandle, config: SpiConfig) -> Self {
        let timing = MasterTiming::from_config(&config);
        Self {
            bus,
            config,
            timing,
        }
    }

    /// Replaces the master timing.
    #[must_use]
    pub const fn with_timing(mut self, timing: MasterTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Active master timing.
    #[must_use]
    pub const fn timing(&self) -> MasterTiming {
        self.timing
    }

    /// Clocks one well-formed frame.
    pub async fn transfer(&self, word: u64) -> Transfer {
        self.transfer_with(word, FaultInjection::none()).await
    }

    /// Writes `value` to `address`; returns the full-duplex reply.
    pub async fn write(&self, address: u8, value: u32) -> Transfer {
        self.transfer(Self::word(Direction::Write, address, value)).await
    }

    /// Reads `address`; returns the reply content.
    pub async fn read(&self, address: u8) -> u32 {
        self.transfer(Self::word(Direction::Read, address, 0))
            .await
            .reply()
    }

    /// Clocks one frame with the given faults injected.
    pub async fn transfer_with(&self, word: u64, faults: FaultInjection) -> Transfer {
        let idle = self.config.clock_idle_level();
        let active = !idle;
        let select = self.config.select_active_level();
        let half = self.timing.half_period_ns;
        let is_read = SpiWord::from_bits(word).direction == Direction::Read;

        if faults.clock_active_at_select {
            self.bus.drive(Line::Sclk, active);
        }
        self.bus.drive(Line::Cs, select);
        self.bus.sleep(self.timing.select_setup_ns).await;
        if faults.clock_active_at_select {
            self.bus.drive(Line::Sclk, idle);
            self.bus.sleep(half).await;
        }

        let total = WORD_BITS.saturating_add(faults.extra_clocks);
        let bits_clocked = faults.abort_after_bits.map_or(total, |limit| limit.min(total));
        let mut received = 0_u64;

        for index in 0..bits_clocked {
            let bit = index < WORD_BITS && (word >> (WORD_BITS - 1 - index)) & 1 == 1;
            self.bus.drive(Line::Sclk, active);
            self.bus.drive(Line::Mosi, bit);
            self.bus.sleep(half).await;

            if index < WORD_BITS {
                received = (received << 1) | u64::from(self.bus.level(Line::Miso));
            }
            self.bus.drive(Line::Sclk, idle);

            let gap = if is_read && index == ADDRESS_BITS {
                half.max(self.timing.read_pause_ns)
            } else {
                half
            };
            self.bus.sleep(gap).await;
        }

        if bits_clocked < WORD_BITS {
            received <<= WORD_BITS - bits_clocked;
        }

        if faults.clock_active_at_deselect {
            self.bus.drive(Line::Sclk, active);
        }
        self.bus.drive(Line::Cs, !select);
        self.bus.sleep(self.timing.frame_spacing_ns).await;
        if faults.clock_active_at_deselect {
            self.bus.drive(Line::Sclk, idle);
            self.bus.sleep(self.timing.frame_spacing_ns).await;
        }

        log::trace!("master sent 0x{word:010X}, received 0x{received:010X}");
        Transfer {
            sent: word,
            received,
            bits_clocked,
        }
    }

    const fn word(direction: Direction, address: u8, content: u32) -> u64 {
        SpiWord {
            direction,
            address,
            content,
        }
        .to_bits()
    }
}
