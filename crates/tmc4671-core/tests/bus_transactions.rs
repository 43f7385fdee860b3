//! Frame-level behavior of the TMC4671 slave on the simulated bus.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use log as _;
use proptest as _;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tmc4671_core::{
    Direction, FaultClass, FaultInjection, HookError, MasterTiming, Phase, RegisterError,
    Simulator, SpiMaster, SpiSlave, SpiWord, Tmc4671, TransactionError, CHIPINFO_ADDR,
    CHIPINFO_DATA, CHIPINFO_TABLE, CHIP_TYPE,
};

struct Bench {
    sim: Simulator,
    slave: Rc<SpiSlave>,
}

impl Bench {
    fn new() -> Self {
        Self::with_slave(Tmc4671::slave().expect("bootstrap is valid"))
    }

    fn with_slave(slave: SpiSlave) -> Self {
        let slave = Rc::new(slave);
        let mut sim = Simulator::for_config(slave.config());
        slave.attach(&mut sim);
        Self { sim, slave }
    }

    fn master(&self) -> SpiMaster {
        SpiMaster::new(self.sim.handle(), *self.slave.config())
    }

    fn drive<T: 'static>(&mut self, stimulus: impl Future<Output = T> + 'static) -> T {
        self.sim.complete(stimulus).expect("stimulus runs to completion")
    }

    fn write(&mut self, address: u8, value: u32) {
        let master = self.master();
        self.drive(async move { master.write(address, value).await });
    }

    fn read(&mut self, address: u8) -> u32 {
        let master = self.master();
        self.drive(async move { master.read(address).await })
    }

    fn inject(&mut self, direction: Direction, address: u8, content: u32, faults: FaultInjection) {
        let master = self.master();
        let word = SpiWord {
            direction,
            address,
            content,
        }
        .to_bits();
        self.drive(async move { master.transfer_with(word, faults).await });
    }

    fn last_fault(&self) -> Option<TransactionError> {
        self.slave
            .last_outcome()
            .and_then(|record| record.outcome.err())
    }

    fn assert_reset_state(&self) {
        assert_eq!(self.slave.register(CHIPINFO_DATA), Ok(CHIP_TYPE));
        assert_eq!(self.slave.register(CHIPINFO_ADDR), Ok(0));
    }
}

#[test]
fn chip_type_is_readable_after_reset() {
    let mut bench = Bench::new();
    assert_eq!(bench.read(CHIPINFO_DATA), u32::from_be_bytes(*b"4671"));
    assert_eq!(bench.slave.diagnostics().reads, 1);
    assert_eq!(bench.last_fault(), None);
}

#[test]
fn write_commits_and_replies_with_previous_value() {
    let mut bench = Bench::new();
    let master = bench.master();
    let transfer = bench.drive(async move { master.write(CHIPINFO_DATA, 0xDEAD_BEEF).await });

    assert!(transfer.header_echoed());
    assert_eq!(transfer.reply(), CHIP_TYPE);
    assert_eq!(bench.slave.register(CHIPINFO_DATA), Ok(0xDEAD_BEEF));
    assert_eq!(bench.read(CHIPINFO_DATA), 0xDEAD_BEEF);
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(4)]
#[case(5)]
fn chipinfo_select_updates_data_register(#[case] select: u32) {
    let mut bench = Bench::new();
    bench.write(CHIPINFO_ADDR, select);

    assert_eq!(bench.read(CHIPINFO_ADDR), select);
    assert_eq!(
        bench.read(CHIPINFO_DATA),
        CHIPINFO_TABLE[usize::try_from(select).expect("small index")]
    );
    assert_eq!(bench.slave.diagnostics().hook_updates, 1);
}

#[rstest]
#[case(6)]
#[case(0x8000_0000)]
fn chipinfo_select_outside_table_is_rejected(#[case] select: u32) {
    let mut bench = Bench::new();
    bench.write(CHIPINFO_ADDR, select);

    assert_eq!(
        bench.last_fault(),
        Some(TransactionError::Hook(HookError::OutOfDomain {
            watch: CHIPINFO_ADDR,
            value: select,
        }))
    );
    bench.assert_reset_state();
    assert_eq!(bench.slave.diagnostics().fault_count(FaultClass::Hook), 1);
}

#[rstest]
#[case(0, Phase::Direction)]
#[case(1, Phase::Address)]
#[case(7, Phase::Address)]
#[case(8, Phase::Data)]
#[case(20, Phase::Data)]
#[case(39, Phase::Data)]
fn aborted_write_leaves_registers_untouched(#[case] bits: u32, #[case] phase: Phase) {
    let mut bench = Bench::new();
    let faults = FaultInjection {
        abort_after_bits: Some(bits),
        ..FaultInjection::none()
    };
    bench.inject(Direction::Write, CHIPINFO_ADDR, 3, faults);

    assert_eq!(
        bench.last_fault(),
        Some(TransactionError::SelectDeasserted { phase })
    );
    bench.assert_reset_state();
    assert!(bench.slave.idle_gate().is_idle());

    bench.write(CHIPINFO_ADDR, 3);
    assert_eq!(bench.read(CHIPINFO_DATA), CHIPINFO_TABLE[3]);
}

#[rstest]
#[case(100, false)]
#[case(249, false)]
#[case(250, true)]
#[case(500, true)]
fn read_pause_is_enforced(#[case] pause_ns: u64, #[case] honoured: bool) {
    let mut bench = Bench::new();
    let master = bench.master().with_timing(
        MasterTiming::from_config(bench.slave.config()).with_read_pause(pause_ns),
    );
    let reply = bench.drive(async move { master.read(CHIPINFO_DATA).await });

    if honoured {
        assert_eq!(reply, CHIP_TYPE);
        assert_eq!(bench.last_fault(), None);
    } else {
        assert_eq!(
            bench.last_fault(),
            Some(TransactionError::ReadPauseViolated { required_ns: 250 })
        );
        assert_eq!(
            bench.slave.diagnostics().fault_count(FaultClass::Timing),
            1
        );
    }
}

#[test]
fn read_aborted_during_pause_releases_the_slave() {
    let mut bench = Bench::new();
    let master = bench.master().with_timing(
        MasterTiming::from_config(bench.slave.config()).with_read_pause(100),
    );
    let word = SpiWord {
        direction: Direction::Read,
        address: CHIPINFO_DATA,
        content: 0,
    }
    .to_bits();
    let faults = FaultInjection {
        abort_after_bits: Some(8),
        ..FaultInjection::none()
    };
    bench.drive(async move { master.transfer_with(word, faults).await });

    assert!(bench.slave.idle_gate().is_idle());
    assert_eq!(
        bench.last_fault(),
        Some(TransactionError::SelectDeasserted {
            phase: Phase::Pause
        })
    );

    assert_eq!(bench.read(CHIPINFO_DATA), CHIP_TYPE);
    assert!(bench
        .slave
        .last_outcome()
        .is_some_and(|record| record.outcome.is_ok()));
    assert_eq!(bench.slave.diagnostics().frames, 2);
}

#[test]
fn extra_clock_is_an_overrun() {
    let mut bench = Bench::new();
    let faults = FaultInjection {
        extra_clocks: 1,
        ..FaultInjection::none()
    };
    bench.inject(Direction::Write, CHIPINFO_ADDR, 2, faults);

    assert_eq!(
        bench.last_fault(),
        Some(TransactionError::Overrun { word_bits: 40 })
    );
    bench.assert_reset_state();
}

#[test]
fn clock_must_idle_at_select() {
    let mut bench = Bench::new();
    let faults = FaultInjection {
        clock_active_at_select: true,
        ..FaultInjection::none()
    };
    bench.inject(Direction::Write, CHIPINFO_ADDR, 2, faults);

    assert_eq!(bench.last_fault(), Some(TransactionError::ClockNotIdleAtSelect));
    bench.assert_reset_state();
    assert_eq!(bench.read(CHIPINFO_DATA), CHIP_TYPE);
}

#[test]
fn clock_must_idle_at_deselect() {
    let mut bench = Bench::new();
    let faults = FaultInjection {
        clock_active_at_deselect: true,
        ..FaultInjection::none()
    };
    bench.inject(Direction::Write, CHIPINFO_ADDR, 2, faults);

    assert_eq!(
        bench.last_fault(),
        Some(TransactionError::ClockNotIdleAtDeselect)
    );
    bench.assert_reset_state();
}

#[rstest]
#[case(Direction::Read)]
#[case(Direction::Write)]
fn unknown_address_is_a_lookup_fault(#[case] direction: Direction) {
    let mut bench = Bench::new();
    bench.inject(direction, 0x10, 1, FaultInjection::none());

    assert_eq!(
        bench.last_fault(),
        Some(TransactionError::Register(RegisterError::UnknownAddress(
            0x10
        )))
    );
    assert_eq!(bench.slave.registers().len(), 2);
    bench.assert_reset_state();
}

#[test]
fn idle_gate_hides_in_flight_writes() {
    let mut bench = Bench::new();
    let handle = bench.sim.handle();
    let observed = Rc::new(RefCell::new(Vec::new()));

    {
        let slave = Rc::clone(&bench.slave);
        let observed = Rc::clone(&observed);
        let handle = handle.clone();
        bench.sim.spawn(async move {
            handle.sleep(1_000).await;
            let raw = slave.register(CHIPINFO_DATA).expect("seeded");
            let gated = slave.get_register(CHIPINFO_DATA).await.expect("seeded");
            observed.borrow_mut().push((raw, gated));
        });
    }
    bench.write(CHIPINFO_ADDR, 2);

    assert_eq!(*observed.borrow(), vec![(CHIP_TYPE, CHIPINFO_TABLE[2])]);
    assert!(bench.slave.idle_gate().is_idle());
}

#[test]
fn stalled_clock_times_out_when_enabled() {
    let slave = Tmc4671::slave()
        .expect("bootstrap is valid")
        .with_timing(tmc4671_core::DeviceTiming::default().with_stall_timeout(1_000));
    let mut bench = Bench::with_slave(slave);
    let handle = bench.sim.handle();

    bench.drive(async move {
        handle.drive(tmc4671_core::Line::Cs, false);
        handle.sleep(5_000).await;
        handle.drive(tmc4671_core::Line::Cs, true);
        handle.sleep(10).await;
    });

    assert_eq!(
        bench.last_fault(),
        Some(TransactionError::ClockStalled {
            phase: Phase::Direction,
            timeout_ns: 1_000,
        })
    );
    assert_eq!(bench.read(CHIPINFO_DATA), CHIP_TYPE);
}

#[test]
fn diagnostics_and_history_track_every_frame() {
    let mut bench = Bench::new();
    let first = bench.slave.next_sequence();
    bench.write(CHIPINFO_ADDR, 1);
    bench.write(CHIPINFO_ADDR, 9);
    bench.read(CHIPINFO_DATA);

    let diag = bench.slave.diagnostics();
    assert_eq!(diag.frames, 3);
    assert_eq!(diag.writes, 1);
    assert_eq!(diag.reads, 1);
    assert_eq!(diag.total_faults(), 1);

    let history = bench.slave.history_since(first);
    assert_eq!(history.len(), 3);
    assert!(history[1].outcome.is_err());
    assert_eq!(
        history[2].outcome.as_ref().map(|transaction| transaction.content),
        Ok(CHIPINFO_TABLE[1])
    );
}
