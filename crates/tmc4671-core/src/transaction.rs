//! Bit-level transaction state machine.
//!
//! One call to [`SpiSlave::transaction`] decodes exactly one frame:
//!
//! 1. wait for select, clear the idle gate, require an idle clock;
//! 2. sample the direction bit and echo it on data-out;
//! 3. sample the 7 address bits (MSB first), echoing each one;
//! 4. wait for the sampling edge closing the address field;
//! 5. on reads, require the minimum pause before the data field;
//! 6. sample 32 content bits while shifting out the stored register value;
//! 7. require select to deassert before any further shifting edge;
//! 8. require an idle clock at deselect;
//! 9. on writes, commit the content and any dependent recomputation.
//!
//! Every wait races against select deassertion, since the master may abort at
//! any bit boundary. The select level is also checked before each wait, so a
//! deassertion that landed while the slave was not listening still ends the
//! frame.

use crate::api::{Edge, Frame, Line, SpiBus, SpiConfig, Trigger};
use crate::device::SpiSlave;
use crate::encoding::{Direction, ADDRESS_BITS, CONTENT_BITS, WORD_BITS};
use crate::fault::{HookError, Phase, TransactionError};
use crate::timing::DeviceTiming;

/// A fully decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Transaction {
    /// Direction bit of the frame.
    pub direction: Direction,
    /// Decoded 7-bit register address.
    pub address: u8,
    /// Content written (writes) or shifted out to the master (reads).
    pub content: u32,
}

/// Edge and timer waits for one frame, all bounded by select deassertion.
struct FrameSampler<'a, B> {
    bus: &'a B,
    frame: Frame,
    shift: Trigger,
    sample: Trigger,
    select_active: bool,
    timing: DeviceTiming,
}

impl<'a, B: SpiBus> FrameSampler<'a, B> {
    fn new(bus: &'a B, frame: Frame, config: &SpiConfig, timing: DeviceTiming) -> Self {
        let clock_edge = |edge: Edge| Trigger::Edge {
            line: Line::Sclk,
            edge,
        };
        Self {
            bus,
            frame,
            shift: clock_edge(config.shift_edge()),
            sample: clock_edge(config.sample_edge()),
            select_active: config.select_active_level(),
            timing,
        }
    }

    /// Fails if select is no longer asserted.
    fn ensure_selected(&self, phase: Phase) -> Result<(), TransactionError> {
        if self.bus.level(Line::Cs) == self.select_active {
            Ok(())
        } else {
            Err(TransactionError::SelectDeasserted { phase })
        }
    }

    /// Waits for the next shifting edge plus the guard delay, then samples data-in.
    async fn next_bit(&self, phase: Phase) -> Result<bool, TransactionError> {
        self.ensure_selected(phase)?;
        let winner = match self.timing.stall_timeout_ns {
            Some(timeout_ns) => {
                self.bus
                    .race(&[self.shift, self.frame.end, Trigger::timer(timeout_ns)])
                    .await
            }
            None => self.bus.race(&[self.shift, self.frame.end]).await,
        };
        if winner == self.frame.end {
            return Err(TransactionError::SelectDeasserted { phase });
        }
        if let Trigger::Timer(timeout_ns) = winner {
            return Err(TransactionError::ClockStalled { phase, timeout_ns });
        }

        let guard = Trigger::timer(self.timing.guard_ns);
        if self.bus.race(&[guard, self.frame.end]).await == self.frame.end {
            return Err(TransactionError::SelectDeasserted { phase });
        }

        let bit = self.bus.level(Line::Mosi);
        log::trace!("sampled {phase} bit {}", u8::from(bit));
        Ok(bit)
    }

    async fn address_boundary(&self) -> Result<(), TransactionError> {
        self.ensure_selected(Phase::Boundary)?;
        if self.bus.race(&[self.sample, self.frame.end]).await == self.frame.end {
            return Err(TransactionError::SelectDeasserted {
                phase: Phase::Boundary,
            });
        }
        Ok(())
    }

    async fn read_pause(&self) -> Result<(), TransactionError> {
        self.ensure_selected(Phase::Pause)?;
        let pause = Trigger::timer(self.timing.read_pause_ns);
        let winner = self.bus.race(&[self.shift, pause, self.frame.end]).await;
        if winner == self.shift {
            return Err(TransactionError::ReadPauseViolated {
                required_ns: self.timing.read_pause_ns,
            });
        }
        self.ensure_selected(Phase::Pause)
    }

    async fn frame_end(&self) -> Result<(), TransactionError> {
        if self.bus.race(&[self.frame.end, self.shift]).await == self.frame.end {
            Ok(())
        } else {
            Err(TransactionError::Overrun {
                word_bits: WORD_BITS,
            })
        }
    }
}

impl SpiSlave {
    /// Decodes one frame bounded by `frame` and applies it to the register file.
    ///
    /// The idle gate is cleared on select; restoring it is the caller's job
    /// (see [`SpiSlave::serve`]).
    ///
    /// # Errors
    ///
    /// Returns the first protocol, timing, lookup or hook failure. The register
    /// file is left untouched on every error path.
    pub async fn transaction<B: SpiBus>(
        &self,
        bus: &B,
        frame: Frame,
    ) -> Result<Transaction, TransactionError> {
        let sampler = FrameSampler::new(bus, frame, self.config(), self.timing());
        let idle_level = self.config().clock_idle_level();

        bus.race(&[frame.start]).await;
        self.idle_gate().clear();
        log::debug!("chip select asserted");

        if bus.level(Line::Sclk) != idle_level {
            return Err(TransactionError::ClockNotIdleAtSelect);
        }

        let direction_bit = sampler.next_bit(Phase::Direction).await?;
        bus.drive(Line::Miso, direction_bit);
        let direction = Direction::from_bit(direction_bit);

        let mut address = 0u8;
        for _ in 0..ADDRESS_BITS {
            let bit = sampler.next_bit(Phase::Address).await?;
            address = (address << 1) | u8::from(bit);
            bus.drive(Line::Miso, bit);
        }

        sampler.address_boundary().await?;

        if direction == Direction::Read {
            sampler.read_pause().await?;
        }

        let stored = self.register(address)?;
        let mut content = 0u32;
        for index in (0..CONTENT_BITS).rev() {
            let bit = sampler.next_bit(Phase::Data).await?;
            content = (content << 1) | u32::from(bit);
            bus.drive(Line::Miso, (stored >> index) & 1 == 1);
        }

        sampler.frame_end().await?;

        if bus.level(Line::Sclk) != idle_level {
            return Err(TransactionError::ClockNotIdleAtDeselect);
        }

        let transaction = match direction {
            Direction::Write => {
                self.commit(address, content)?;
                Transaction {
                    direction,
                    address,
                    content,
                }
            }
            Direction::Read => Transaction {
                direction,
                address,
                content: stored,
            },
        };
        log::debug!(
            "{} 0x{:02X} = 0x{:08X}",
            transaction.direction,
            transaction.address,
            transaction.content
        );
        Ok(transaction)
    }

    /// Stores `content` and the hook-derived dependents, all or nothing.
    fn commit(&self, address: u8, content: u32) -> Result<(), TransactionError> {
        let updates = self.hooks().on_write(address, content)?.unwrap_or_default();

        let mut registers = self.registers_mut();
        registers.get(address)?;
        for &(dependent, _) in &updates {
            registers
                .get(dependent)
                .map_err(|source| HookError::Register {
                    watch: address,
                    source,
                })?;
        }

        registers.set(address, content)?;
        for &(dependent, value) in &updates {
            registers.set(dependent, value)?;
            log::trace!("hook on 0x{address:02X} updated 0x{dependent:02X} = 0x{value:08X}");
        }
        drop(registers);

        self.note_hook_updates(updates.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::api::SpiConfig;
    use crate::device::SpiSlave;
    use crate::fault::{HookError, RegisterError, TransactionError};
    use crate::hooks::HookRegistry;
    use crate::master::SpiMaster;
    use crate::registers::RegisterFile;
    use crate::sim::Simulator;

    fn pair(_: u32) -> Option<Vec<u32>> {
        Some(vec![1, 2])
    }

    fn double(value: u32) -> Option<Vec<u32>> {
        Some(vec![value.wrapping_mul(2)])
    }

    fn write_once(hooks: HookRegistry, address: u8, value: u32) -> (Rc<SpiSlave>, RegisterFile) {
        let registers = RegisterFile::seed([(0x00, 0xAA), (0x01, 0xBB)]).expect("valid seed");
        let before = registers.clone();
        let slave =
            Rc::new(SpiSlave::new(SpiConfig::default(), registers, hooks).expect("valid config"));
        let mut sim = Simulator::for_config(slave.config());
        slave.attach(&mut sim);
        let master = SpiMaster::new(sim.handle(), *slave.config());
        sim.complete(async move {
            master.write(address, value).await;
        });
        (slave, before)
    }

    #[test]
    fn hook_dependents_are_written_after_the_watch_value() {
        let hooks = HookRegistry::new().with_hook(0x01, [0x00], double);
        let (slave, _) = write_once(hooks, 0x01, 21);
        assert_eq!(slave.register(0x01), Ok(21));
        assert_eq!(slave.register(0x00), Ok(42));
    }

    #[test]
    fn arity_mismatch_commits_nothing() {
        let hooks = HookRegistry::new().with_hook(0x01, [0x00], pair);
        let (slave, before) = write_once(hooks, 0x01, 5);
        assert_eq!(
            slave.last_outcome().map(|record| record.outcome),
            Some(Err(TransactionError::Hook(HookError::ArityMismatch {
                watch: 0x01,
                expected: 1,
                actual: 2,
            })))
        );
        assert_eq!(*slave.registers(), before);
    }

    #[test]
    fn missing_dependent_commits_nothing() {
        let hooks = HookRegistry::new().with_hook(0x01, [0x30], double);
        let (slave, before) = write_once(hooks, 0x01, 5);
        assert_eq!(
            slave.last_outcome().map(|record| record.outcome),
            Some(Err(TransactionError::Hook(HookError::Register {
                watch: 0x01,
                source: RegisterError::UnknownAddress(0x30),
            })))
        );
        assert_eq!(*slave.registers(), before);
    }
}
