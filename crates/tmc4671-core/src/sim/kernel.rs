//! Deterministic discrete-event kernel driving the SPI bundle.
//!
//! Time advances in nanoseconds. Each time step is split into delta steps:
//! scheduled drives are applied, the resulting edges are recorded for that
//! delta only, and every task is polled once. Drives made by a task while it
//! is being polled are applied in the next delta at the same simulated time,
//! so all tasks observe the same edges in the same order.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use crate::api::{Edge, Line, SpiBus, SpiConfig, Trigger};

/// Simulated time in nanoseconds.
pub type SimTime = u64;

type Task = Pin<Box<dyn Future<Output = ()>>>;

#[derive(Debug, Default)]
struct KernelState {
    now: SimTime,
    delta: u64,
    levels: [bool; Line::COUNT],
    edges: Vec<(Line, Edge)>,
    scheduled: BTreeMap<SimTime, Vec<(Line, bool)>>,
    pending: Vec<(Line, bool)>,
    wakeups: BTreeSet<SimTime>,
}

impl KernelState {
    /// Opens a new delta step and applies `drives` in order.
    fn apply(&mut self, drives: Vec<(Line, bool)>) {
        self.delta += 1;
        self.edges.clear();
        for (line, level) in drives {
            let slot = &mut self.levels[line.index()];
            if let Some(edge) = Edge::between(*slot, level) {
                *slot = level;
                self.edges.push((line, edge));
            }
        }
    }

    fn fired(&self, trigger: Trigger, armed: Armed) -> bool {
        match trigger {
            Trigger::Edge { line, edge } => self.edges.contains(&(line, edge)),
            Trigger::Timer(ns) => self.now >= armed.at.saturating_add(ns),
        }
    }

    fn next_event(&self) -> Option<SimTime> {
        let next_drive = self.scheduled.keys().next().copied();
        let next_wakeup = self.wakeups.iter().next().copied();
        next_drive.into_iter().chain(next_wakeup).min()
    }
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    delta: u64,
    at: SimTime,
}

/// Future returned by [`SimHandle::race`].
///
/// Arms its triggers on first poll; an edge only counts when it happens in a
/// later delta step than the one the race was armed in.
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct Race {
    state: Rc<RefCell<KernelState>>,
    triggers: Vec<Trigger>,
    armed: Option<Armed>,
}

impl Future for Race {
    type Output = Trigger;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.state.borrow_mut();

        let Some(armed) = this.armed else {
            let armed = Armed {
                delta: state.delta,
                at: state.now,
            };
            for trigger in &this.triggers {
                if let Trigger::Timer(ns) = trigger {
                    let deadline = armed.at.saturating_add(*ns);
                    state.wakeups.insert(deadline);
                }
            }
            this.armed = Some(armed);
            return Poll::Pending;
        };

        if state.delta == armed.delta {
            return Poll::Pending;
        }

        this.triggers
            .iter()
            .copied()
            .find(|trigger| state.fired(*trigger, armed))
            .map_or(Poll::Pending, Poll::Ready)
    }
}

/// Cheap, clonable access to the kernel from inside tasks.
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Rc<RefCell<KernelState>>,
}

impl SimHandle {
    /// Current simulated time.
    #[must_use]
    pub fn now(&self) -> SimTime {
        self.state.borrow().now
    }

    /// Current level of `line`.
    #[must_use]
    pub fn level(&self, line: Line) -> bool {
        self.state.borrow().levels[line.index()]
    }

    /// Drives `line`; the change lands in the next delta at the current time.
    pub fn drive(&self, line: Line, level: bool) {
        self.state.borrow_mut().pending.push((line, level));
    }

    /// Schedules a drive of `line` at absolute time `at`.
    ///
    /// Times in the past are applied in the next delta step.
    pub fn drive_at(&self, at: SimTime, line: Line, level: bool) {
        let mut state = self.state.borrow_mut();
        if at <= state.now {
            state.pending.push((line, level));
        } else {
            state.scheduled.entry(at).or_default().push((line, level));
        }
    }

    /// Races `triggers`; earlier entries win ties.
    pub fn race(&self, triggers: &[Trigger]) -> Race {
        Race {
            state: Rc::clone(&self.state),
            triggers: triggers.to_vec(),
            armed: None,
        }
    }

    /// Waits for a single trigger.
    pub fn wait(&self, trigger: Trigger) -> Race {
        self.race(&[trigger])
    }

    /// Suspends the calling task for `ns` nanoseconds.
    pub async fn sleep(&self, ns: u64) {
        self.wait(Trigger::Timer(ns)).await;
    }
}

impl SpiBus for SimHandle {
    fn race(&self, triggers: &[Trigger]) -> impl Future<Output = Trigger> {
        Self::race(self, triggers)
    }

    fn level(&self, line: Line) -> bool {
        Self::level(self, line)
    }

    fn drive(&self, line: Line, level: bool) {
        Self::drive(self, line, level);
    }
}

#[derive(Debug, Default)]
struct RepollFlag(AtomicBool);

impl Wake for RepollFlag {
    fn wake(self: Arc<Self>) {
        self.0.store(true, Ordering::Relaxed);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Single-threaded executor owning the simulated bus and its tasks.
pub struct Simulator {
    handle: SimHandle,
    tasks: Vec<Task>,
    repoll: Arc<RepollFlag>,
    waker: Waker,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("handle", &self.handle)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    /// Creates a kernel at time zero with every line low.
    #[must_use]
    pub fn new() -> Self {
        let repoll = Arc::new(RepollFlag::default());
        let waker = Waker::from(Arc::clone(&repoll));
        Self {
            handle: SimHandle {
                state: Rc::new(RefCell::new(KernelState::default())),
            },
            tasks: Vec::new(),
            repoll,
            waker,
        }
    }

    /// Creates a kernel with select deasserted and the clock at its idle level.
    #[must_use]
    pub fn for_config(config: &SpiConfig) -> Self {
        Self::new()
            .with_level(Line::Cs, !config.select_active_level())
            .with_level(Line::Sclk, config.clock_idle_level())
    }

    /// Sets the initial level of `line` without producing an edge.
    #[must_use]
    pub fn with_level(self, line: Line, level: bool) -> Self {
        self.handle.state.borrow_mut().levels[line.index()] = level;
        self
    }

    /// Handle for tasks and harness code.
    #[must_use]
    pub fn handle(&self) -> SimHandle {
        self.handle.clone()
    }

    /// Current simulated time.
    #[must_use]
    pub fn now(&self) -> SimTime {
        self.handle.now()
    }

    /// Number of tasks that have not completed yet.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Adds a task; it is first polled on the next run.
    pub fn spawn(&mut self, task: impl Future<Output = ()> + 'static) {
        self.tasks.push(Box::pin(task));
    }

    /// Runs until no drive or timer is pending. Returns the final time.
    pub fn run(&mut self) -> SimTime {
        self.run_until(SimTime::MAX)
    }

    /// Runs until `deadline` or until nothing is pending, whichever is first.
    pub fn run_until(&mut self, deadline: SimTime) -> SimTime {
        loop {
            self.poll_tasks();

            let mut state = self.handle.state.borrow_mut();
            if !state.pending.is_empty() || self.repoll.0.swap(false, Ordering::Relaxed) {
                let drives = std::mem::take(&mut state.pending);
                state.apply(drives);
                continue;
            }

            let Some(next) = state.next_event() else {
                return state.now;
            };
            if next > deadline {
                state.now = state.now.max(deadline);
                return state.now;
            }

            state.now = next;
            state.wakeups = state.wakeups.split_off(&next.saturating_add(1));
            let drives = state.scheduled.remove(&next).unwrap_or_default();
            state.apply(drives);
        }
    }

    /// Spawns `future`, runs to quiescence and returns its output if it finished.
    pub fn complete<T: 'static>(
        &mut self,
        future: impl Future<Output = T> + 'static,
    ) -> Option<T> {
        let slot = Rc::new(RefCell::new(None));
        let target = Rc::clone(&slot);
        self.spawn(async move {
            let output = future.await;
            *target.borrow_mut() = Some(output);
        });
        self.run();
        slot.take()
    }

    fn poll_tasks(&mut self) {
        let mut cx = Context::from_waker(&self.waker);
        self.tasks
            .retain_mut(|task| task.as_mut().poll(&mut cx).is_pending());
    }
}
