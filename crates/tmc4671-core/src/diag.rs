//! Per-slave diagnostics counters and bounded transaction history.

use std::collections::VecDeque;

use crate::fault::{FaultClass, TransactionError};
use crate::transaction::Transaction;
use crate::Direction;

/// Number of outcomes retained by [`TransactionHistory`].
pub const HISTORY_CAPACITY: usize = 64;

/// Saturating counters updated by the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiagCounters {
    /// Frames that reached the dispatcher, successful or not.
    pub frames: u64,
    /// Completed read transactions.
    pub reads: u64,
    /// Committed write transactions.
    pub writes: u64,
    /// Dependent registers rewritten by change hooks.
    pub hook_updates: u64,
    /// Fault counts indexed by [`FaultClass::index`].
    pub faults: [u64; FaultClass::COUNT],
    /// Most recent fault, if any.
    pub last_fault: Option<TransactionError>,
}

impl DiagCounters {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts one transaction outcome.
    pub fn record(&mut self, outcome: &Result<Transaction, TransactionError>) {
        self.frames = self.frames.saturating_add(1);
        match outcome {
            Ok(transaction) => match transaction.direction {
                Direction::Read => self.reads = self.reads.saturating_add(1),
                Direction::Write => self.writes = self.writes.saturating_add(1),
            },
            Err(fault) => {
                let slot = &mut self.faults[fault.class().index()];
                *slot = slot.saturating_add(1);
                self.last_fault = Some(fault.clone());
            }
        }
    }

    /// Adds `count` hook-driven dependent updates.
    #[allow(clippy::missing_const_for_fn)]
    pub fn record_hook_updates(&mut self, count: usize) {
        let count = u64::try_from(count).unwrap_or(u64::MAX);
        self.hook_updates = self.hook_updates.saturating_add(count);
    }

    /// Fault count for one class.
    #[must_use]
    pub const fn fault_count(&self, class: FaultClass) -> u64 {
        self.faults[class.index()]
    }

    /// Sum of all fault counters.
    #[must_use]
    pub fn total_faults(&self) -> u64 {
        self.faults
            .iter()
            .fold(0_u64, |total, count| total.saturating_add(*count))
    }

    /// Resets every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One dispatched frame and how it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    /// Zero-based frame number since the slave was created.
    pub sequence: u64,
    /// Decoded transaction or the fault that aborted it.
    pub outcome: Result<Transaction, TransactionError>,
}

/// Ring of the most recent [`TransactionRecord`]s.
#[derive(Debug, Clone, Default)]
pub struct TransactionHistory {
    records: VecDeque<TransactionRecord>,
    next_sequence: u64,
}

impl TransactionHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an outcome, evicting the oldest record at capacity.
    pub fn push(&mut self, outcome: Result<Transaction, TransactionError>) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.saturating_add(1);
        if self.records.len() == HISTORY_CAPACITY {
            self.records.pop_front();
        }
        self.records.push_back(TransactionRecord { sequence, outcome });
        sequence
    }

    /// Most recent record.
    #[must_use]
    pub fn last(&self) -> Option<&TransactionRecord> {
        self.records.back()
    }

    /// Records with a sequence number of at least `sequence`, oldest first.
    pub fn since(&self, sequence: u64) -> impl Iterator<Item = &TransactionRecord> + '_ {
        self.records
            .iter()
            .filter(move |record| record.sequence >= sequence)
    }

    /// Retained records, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TransactionRecord> + '_ {
        self.records.iter()
    }

    /// Sequence number the next record will receive.
    #[must_use]
    pub const fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
