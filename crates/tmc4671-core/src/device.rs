//! Emulated SPI slave: register state, change hooks and the frame dispatcher.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::api::{SpiBus, SpiConfig};
use crate::diag::{DiagCounters, TransactionHistory, TransactionRecord};
use crate::encoding::{encode, Direction};
use crate::fault::{ConfigError, EncodeError, RegisterError, TransactionError};
use crate::hooks::HookRegistry;
use crate::registers::RegisterFile;
use crate::sim::{IdleGate, Simulator};
use crate::timing::DeviceTiming;
use crate::transaction::Transaction;

/// Register-level SPI slave decoded at signal level.
///
/// The slave owns its register file and hook registry. Bus access goes
/// through [`SpiBus`], so the same slave can sit on the bundled simulator or
/// any other event substrate.
#[derive(Debug)]
pub struct SpiSlave {
    config: SpiConfig,
    timing: DeviceTiming,
    registers: RefCell<RegisterFile>,
    hooks: HookRegistry,
    idle: IdleGate,
    diag: RefCell<DiagCounters>,
    history: RefCell<TransactionHistory>,
}

impl SpiSlave {
    /// Builds a slave with default [`DeviceTiming`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` does not describe the fixed
    /// 40-bit MSB-first layout.
    pub fn new(
        config: SpiConfig,
        registers: RegisterFile,
        hooks: HookRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            timing: DeviceTiming::default(),
            registers: RefCell::new(registers),
            hooks,
            idle: IdleGate::new(),
            diag: RefCell::new(DiagCounters::new()),
            history: RefCell::new(TransactionHistory::new()),
        })
    }

    /// Replaces the timing thresholds.
    #[must_use]
    pub const fn with_timing(mut self, timing: DeviceTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Bus configuration.
    #[must_use]
    pub const fn config(&self) -> &SpiConfig {
        &self.config
    }

    /// Timing thresholds enforced by the state machine.
    #[must_use]
    pub const fn timing(&self) -> DeviceTiming {
        self.timing
    }

    /// Registered change hooks.
    #[must_use]
    pub const fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Idle gate cleared during a transaction.
    #[must_use]
    pub const fn idle_gate(&self) -> &IdleGate {
        &self.idle
    }

    /// Serves frames forever, one transaction at a time.
    ///
    /// Every outcome is recorded, faults are logged, and the idle gate is set
    /// again whether the frame committed or not.
    pub async fn serve<B: SpiBus>(&self, bus: &B) {
        let frame = self.config.frame();
        loop {
            let outcome = self.transaction(bus, frame).await;
            if let Err(fault) = &outcome {
                log::warn!("frame rejected ({}): {fault}", fault.class().name());
            }
            self.record(outcome);
            self.idle.set();
        }
    }

    /// Spawns [`SpiSlave::serve`] on `sim`.
    pub fn attach(self: &Rc<Self>, sim: &mut Simulator) {
        let slave = Rc::clone(self);
        let bus = sim.handle();
        sim.spawn(async move { slave.serve(&bus).await });
    }

    /// Reads a register once no transaction is in progress.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::UnknownAddress`] for unseeded addresses.
    pub async fn get_register(&self, address: u8) -> Result<u32, RegisterError> {
        self.idle.wait().await;
        self.register(address)
    }

    /// Reads a register immediately, without waiting for the idle gate.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::UnknownAddress`] for unseeded addresses.
    pub fn register(&self, address: u8) -> Result<u32, RegisterError> {
        self.registers.borrow().get(address)
    }

    /// Overwrites a seeded register out of band. Hooks are not run.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::UnknownAddress`] for unseeded addresses.
    pub fn set_register(&self, address: u8, value: u32) -> Result<(), RegisterError> {
        self.registers.borrow_mut().set(address, value)
    }

    /// Borrowed view of the whole register file.
    #[must_use]
    pub fn registers(&self) -> Ref<'_, RegisterFile> {
        self.registers.borrow()
    }

    /// Builds the 40-bit word a master would send for this slave.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::UnknownAddress`] when `address` is not seeded.
    pub fn create_spi_word(
        &self,
        direction: Direction,
        address: u8,
        content: u32,
    ) -> Result<u64, EncodeError> {
        encode(direction, address, content, &self.registers.borrow())
    }

    /// Snapshot of the diagnostics counters.
    #[must_use]
    pub fn diagnostics(&self) -> DiagCounters {
        self.diag.borrow().clone()
    }

    /// Most recently dispatched frame.
    #[must_use]
    pub fn last_outcome(&self) -> Option<TransactionRecord> {
        self.history.borrow().last().cloned()
    }

    /// Retained outcomes numbered `sequence` and later, oldest first.
    #[must_use]
    pub fn history_since(&self, sequence: u64) -> Vec<TransactionRecord> {
        self.history.borrow().since(sequence).cloned().collect()
    }

    /// Sequence number the next dispatched frame will receive.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.history.borrow().next_sequence()
    }

    pub(crate) fn registers_mut(&self) -> RefMut<'_, RegisterFile> {
        self.registers.borrow_mut()
    }

    pub(crate) fn note_hook_updates(&self, count: usize) {
        self.diag.borrow_mut().record_hook_updates(count);
    }

    fn record(&self, outcome: Result<Transaction, TransactionError>) {
        self.diag.borrow_mut().record(&outcome);
        self.history.borrow_mut().push(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::SpiSlave;
    use crate::api::SpiConfig;
    use crate::encoding::Direction;
    use crate::fault::{ConfigError, EncodeError, RegisterError};
    use crate::hooks::HookRegistry;
    use crate::registers::RegisterFile;
    use crate::sim::Simulator;

    fn slave() -> SpiSlave {
        let registers = RegisterFile::seed([(0x00, 7), (0x01, 0)]).expect("valid seed");
        SpiSlave::new(SpiConfig::default(), registers, HookRegistry::new()).expect("valid config")
    }

    #[test]
    fn rejects_foreign_word_layouts() {
        let config = SpiConfig {
            word_width: 16,
            ..SpiConfig::default()
        };
        let result = SpiSlave::new(config, RegisterFile::default(), HookRegistry::new());
        assert_eq!(result.err(), Some(ConfigError::WordWidthMismatch(16)));
    }

    #[test]
    fn out_of_band_access_respects_seeded_addresses() {
        let slave = slave();
        assert_eq!(slave.register(0x00), Ok(7));
        slave.set_register(0x00, 9).expect("seeded");
        assert_eq!(slave.register(0x00), Ok(9));
        assert_eq!(
            slave.set_register(0x22, 1),
            Err(RegisterError::UnknownAddress(0x22))
        );
        assert_eq!(slave.registers().len(), 2);
    }

    #[test]
    fn create_spi_word_checks_address() {
        let slave = slave();
        assert_eq!(
            slave.create_spi_word(Direction::Write, 0x01, 0x0000_0003),
            Ok(0x81_0000_0003)
        );
        assert!(matches!(
            slave.create_spi_word(Direction::Read, 0x05, 0),
            Err(EncodeError::UnknownAddress { address: 0x05, .. })
        ));
    }

    #[test]
    fn get_register_waits_for_idle() {
        let slave = std::rc::Rc::new(slave());
        slave.idle_gate().clear();

        let mut sim = Simulator::new();
        let handle = sim.handle();
        {
            let slave = std::rc::Rc::clone(&slave);
            sim.spawn(async move {
                handle.sleep(40).await;
                slave.set_register(0x00, 11).expect("seeded");
                slave.idle_gate().set();
            });
        }
        let reader = std::rc::Rc::clone(&slave);
        let value = sim.complete(async move { reader.get_register(0x00).await });
        assert_eq!(value, Some(Ok(11)));
    }
}
