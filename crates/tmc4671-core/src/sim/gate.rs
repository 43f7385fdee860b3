use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

#[derive(Debug)]
struct GateState {
    idle: Cell<bool>,
    waiters: RefCell<Vec<Waker>>,
}

/// Readiness flag guarding the register file against mid-frame reads.
///
/// Cleared when a frame starts and set again once the transaction has
/// returned; readers await [`IdleGate::wait`] before trusting register
/// contents.
#[derive(Debug, Clone)]
pub struct IdleGate {
    state: Rc<GateState>,
}

impl Default for IdleGate {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleGate {
    /// Creates a gate in the idle state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(GateState {
                idle: Cell::new(true),
                waiters: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Marks a transaction in progress.
    pub fn clear(&self) {
        self.state.idle.set(false);
    }

    /// Marks the bus idle and wakes every waiter.
    pub fn set(&self) {
        self.state.idle.set(true);
        for waker in self.state.waiters.borrow_mut().drain(..) {
            waker.wake();
        }
    }

    /// Returns `true` when no transaction is in progress.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state.idle.get()
    }

    /// Resolves once the gate is idle; immediately when it already is.
    pub fn wait(&self) -> IdleWait {
        IdleWait {
            state: Rc::clone(&self.state),
        }
    }
}

/// Future returned by [`IdleGate::wait`].
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct IdleWait {
    state: Rc<GateState>,
}

impl Future for IdleWait {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.state.idle.get() {
            Poll::Ready(())
        } else {
            let mut waiters = self.state.waiters.borrow_mut();
            if !waiters.iter().any(|waiter| waiter.will_wake(cx.waker())) {
                waiters.push(cx.waker().clone());
            }
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::IdleGate;
    use crate::sim::Simulator;

    #[test]
    fn wait_resolves_immediately_when_idle() {
        let gate = IdleGate::new();
        let mut sim = Simulator::new();
        let waiter = gate.clone();
        assert_eq!(sim.complete(async move { waiter.wait().await }), Some(()));
    }

    #[test]
    fn wait_blocks_until_set() {
        let gate = IdleGate::new();
        gate.clear();
        assert!(!gate.is_idle());

        let mut sim = Simulator::new();
        let handle = sim.handle();
        let resumed_at = Rc::new(RefCell::new(None));

        {
            let gate = gate.clone();
            let handle = handle.clone();
            let resumed_at = Rc::clone(&resumed_at);
            sim.spawn(async move {
                gate.wait().await;
                *resumed_at.borrow_mut() = Some(handle.now());
            });
        }
        {
            let gate = gate.clone();
            sim.spawn(async move {
                handle.sleep(75).await;
                gate.set();
            });
        }

        sim.run();
        assert!(gate.is_idle());
        assert_eq!(*resumed_at.borrow(), Some(75));
    }
}
