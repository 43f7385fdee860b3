//! Scenario execution against a freshly reset TMC4671 on the simulated bus.
//!
//! ## Execution Model
//!
//! 1. Build the reset-state slave and attach its dispatcher to a new simulator.
//! 2. For each step in file order:
//!    a. Clock the frame (or wait for the idle gate, for `peek`).
//!    b. Run the simulator until the bus is quiet.
//!    c. Collect the slave outcomes recorded for that frame.
//!    d. Compare the reply and the outcome against the step's expectations.
//! 3. Report per-step results and the slave diagnostics.

use std::fmt;
use std::rc::Rc;

use tmc4671_core::{
    ConfigError, DiagCounters, Direction, FaultClass, FaultInjection, MasterTiming, Simulator,
    SpiMaster, SpiSlave, SpiWord, Tmc4671, TransactionError,
};

use crate::scenario::{Check, Scenario, ScenarioStep, Step, StepOptions};

/// Result of running one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    /// 1-indexed source line of the step.
    pub line: usize,
    /// Step text as written.
    pub text: String,
    /// Whether the step met its expectations.
    pub passed: bool,
    /// What was observed.
    pub detail: String,
}

/// Result of running a whole scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Results for each step in order.
    pub step_results: Vec<StepResult>,
    /// Slave diagnostics after the last step.
    pub diagnostics: DiagCounters,
}

impl RunResult {
    /// Returns true if every step passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.step_results.iter().all(|step| step.passed)
    }

    /// Returns counts for summary reporting.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let passed = self.step_results.iter().filter(|step| step.passed).count();
        RunSummary {
            passed,
            failed: self.step_results.len() - passed,
            total: self.step_results.len(),
        }
    }
}

/// Summary counts for run reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Steps that passed.
    pub passed: usize,
    /// Steps that failed.
    pub failed: usize,
    /// Total steps.
    pub total: usize,
}

/// Runs every step of `scenario` against one slave instance.
///
/// # Errors
///
/// Returns [`ConfigError`] if the TMC4671 bootstrap is rejected.
pub fn run_scenario(scenario: &Scenario) -> Result<RunResult, ConfigError> {
    let slave = Rc::new(Tmc4671::slave()?);
    let mut sim = Simulator::for_config(slave.config());
    slave.attach(&mut sim);

    let step_results = scenario
        .steps
        .iter()
        .map(|step| {
            let result = run_step(&mut sim, &slave, step);
            log::info!("line {}: {}", result.line, result.detail);
            result
        })
        .collect();

    Ok(RunResult {
        step_results,
        diagnostics: slave.diagnostics(),
    })
}

fn run_step(sim: &mut Simulator, slave: &Rc<SpiSlave>, step: &ScenarioStep) -> StepResult {
    let (passed, detail) = match step.step {
        Step::Write {
            address,
            value,
            options,
        } => {
            let frame = clock_frame(sim, slave, Direction::Write, address, value, options);
            let detail = format!("write 0x{address:02X} = 0x{value:08X}: {}", frame.describe());
            (frame.outcome_matches(options.expect), detail)
        }
        Step::Read {
            address,
            check,
            options,
        } => {
            let frame = clock_frame(sim, slave, Direction::Read, address, 0, options);
            let reply_ok = check.map_or(true, |check| {
                frame
                    .reply
                    .is_some_and(|reply| check.operator.holds(reply, check.expected))
            });
            let mut detail = format!("read 0x{address:02X}: {}", frame.describe());
            if let Some(check) = check {
                detail.push_str(&format!(" (expected {})", describe_check(check)));
            }
            (frame.outcome_matches(options.expect) && reply_ok, detail)
        }
        Step::Peek { address, check } => {
            let reader = Rc::clone(slave);
            let value = sim.complete(async move { reader.get_register(address).await });
            match value {
                Some(Ok(value)) => (
                    check.operator.holds(value, check.expected),
                    format!(
                        "peek 0x{address:02X} -> 0x{value:08X} (expected {})",
                        describe_check(check)
                    ),
                ),
                Some(Err(error)) => (false, format!("peek 0x{address:02X}: {error}")),
                None => (false, format!("peek 0x{address:02X}: bus never went idle")),
            }
        }
    };

    StepResult {
        line: step.line,
        text: step.text.clone(),
        passed,
        detail,
    }
}

fn describe_check(check: Check) -> String {
    format!("{} 0x{:08X}", check.operator, check.expected)
}

/// What one clocked frame produced on both sides of the bus.
struct FrameReport {
    reply: Option<u32>,
    faults: Vec<TransactionError>,
    completed: usize,
}

impl FrameReport {
    fn outcome_matches(&self, expect: Option<FaultClass>) -> bool {
        match expect {
            Some(class) => self.faults.iter().any(|fault| fault.class() == class),
            None => self.faults.is_empty() && self.completed > 0,
        }
    }

    fn describe(&self) -> String {
        match (self.faults.first(), self.reply) {
            (Some(fault), _) => format!("{} fault: {fault}", fault.class().name()),
            (None, Some(reply)) if self.completed > 0 => format!("ok, reply 0x{reply:08X}"),
            (None, _) => "no response from slave".to_string(),
        }
    }
}

fn clock_frame(
    sim: &mut Simulator,
    slave: &SpiSlave,
    direction: Direction,
    address: u8,
    content: u32,
    options: StepOptions,
) -> FrameReport {
    let mut timing = MasterTiming::from_config(slave.config());
    if let Some(pause_ns) = options.pause_ns {
        timing = timing.with_read_pause(pause_ns);
    }
    let master = SpiMaster::new(sim.handle(), *slave.config()).with_timing(timing);
    let faults = FaultInjection {
        abort_after_bits: options.abort_after_bits,
        extra_clocks: options.extra_clocks,
        ..FaultInjection::none()
    };
    let word = SpiWord {
        direction,
        address,
        content,
    }
    .to_bits();

    let first = slave.next_sequence();
    let transfer = sim.complete(async move { master.transfer_with(word, faults).await });
    let records = slave.history_since(first);

    let mut report = FrameReport {
        reply: transfer.map(|transfer| transfer.reply()),
        faults: Vec::new(),
        completed: 0,
    };
    for record in records {
        match record.outcome {
            Ok(_) => report.completed += 1,
            Err(fault) => report.faults.push(fault),
        }
    }
    report
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed { "PASS" } else { "FAIL" };
        write!(f, "{verdict} (line {}): {}", self.line, self.detail)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} passed, {} failed", self.passed, self.failed)
    }
}
