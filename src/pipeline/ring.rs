//! Fixed-capacity ring of reusable event slots.
//!
//! Sequence bookkeeping lives behind one mutex (`Cursors`); each slot has its
//! own mutex so a worker can process a slot without holding the cursor lock.
//! Lock order is always cursors → slot.

use super::metrics::PipelineMetrics;
use super::EventSlot;
use crate::error::PipelineError;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{trace, warn};

/// Lock ignoring poison. Slot and cursor invariants are restored by the
/// code paths that run after a caught panic, so the data stays usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Cursors {
    /// Next sequence a producer will claim.
    next_claim: u64,
    /// Sequence most recently written into each slot.
    slot_sequence: Box<[Option<u64>]>,
    /// Worker groups that have not finished the slot's current sequence.
    pending: Box<[usize]>,
    /// Slot was published empty because its translator panicked. Workers
    /// step over it without running a consumer.
    vacant: Box<[bool]>,
    /// Next sequence each worker group will take.
    group_cursors: Box<[u64]>,
    accepting: bool,
    halted: bool,
}

pub(crate) struct RingBuffer<E> {
    slots: Box<[Mutex<E>]>,
    capacity: u64,
    mask: u64,
    groups: usize,
    state: Mutex<Cursors>,
    /// Producers wait here for a slot to be released.
    space: Condvar,
    /// Workers wait here for a sequence to be published.
    available: Condvar,
    metrics: PipelineMetrics,
}

impl<E: EventSlot> RingBuffer<E> {
    pub(crate) fn new<F>(capacity: usize, groups: usize, mut factory: F) -> Result<Self, PipelineError>
    where
        F: FnMut() -> E,
    {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(PipelineError::InvalidCapacity(capacity));
        }
        if groups == 0 {
            return Err(PipelineError::NoWorkerGroups);
        }

        let slots: Box<[Mutex<E>]> = (0..capacity).map(|_| Mutex::new(factory())).collect();
        let state = Cursors {
            next_claim: 0,
            slot_sequence: vec![None; capacity].into_boxed_slice(),
            pending: vec![0; capacity].into_boxed_slice(),
            vacant: vec![false; capacity].into_boxed_slice(),
            group_cursors: vec![0; groups].into_boxed_slice(),
            accepting: true,
            halted: false,
        };

        Ok(Self {
            slots,
            capacity: capacity as u64,
            mask: capacity as u64 - 1,
            groups,
            state: Mutex::new(state),
            space: Condvar::new(),
            available: Condvar::new(),
            metrics: PipelineMetrics::default(),
        })
    }

    #[inline]
    fn index(&self, sequence: u64) -> usize {
        (sequence & self.mask) as usize
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity as usize
    }

    pub(crate) fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Claim the next sequence, wait for its slot to be free, fill it with
    /// `translate` and publish it.
    ///
    /// A slot is free once the sequence that last occupied it has been
    /// processed by every worker group and cleared. Waiting for that is the
    /// backpressure that bounds memory.
    ///
    /// If `translate` panics the claimed sequence is still published, empty,
    /// so no worker group stalls on it; the panic then resumes in the caller.
    pub(crate) fn publish_with<F>(&self, translate: F) -> Result<u64, PipelineError>
    where
        F: FnOnce(&mut E),
    {
        let mut state = lock(&self.state);
        if !state.accepting {
            return Err(PipelineError::ShutDown);
        }

        let sequence = state.next_claim;
        state.next_claim += 1;
        let idx = self.index(sequence);
        let previous = sequence.checked_sub(self.capacity);

        let mut waited = false;
        while state.slot_sequence[idx] != previous || state.pending[idx] != 0 {
            if state.halted {
                return Err(PipelineError::ShutDown);
            }
            if !waited {
                waited = true;
                self.metrics.record_publisher_wait();
                trace!(sequence, slot = idx, "Publisher waiting for free slot");
            }
            state = self
                .space
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let filled = {
            let mut slot = lock(&self.slots[idx]);
            if !slot.is_clear() {
                // Cannot happen while the claim protocol holds; clear rather
                // than mixing two requests in one slot.
                warn!(sequence, slot = idx, "Reused slot was not cleared");
                slot.clear();
            }
            let filled = catch_unwind(AssertUnwindSafe(|| translate(&mut slot)));
            if filled.is_err() {
                slot.clear();
            }
            filled
        };
        state.slot_sequence[idx] = Some(sequence);
        state.pending[idx] = self.groups;
        state.vacant[idx] = filled.is_err();
        drop(state);
        self.available.notify_all();

        match filled {
            Ok(()) => {
                self.metrics.record_publish();
                Ok(sequence)
            }
            Err(panic) => {
                warn!(sequence, slot = idx, "Event translator panicked; slot published empty");
                resume_unwind(panic)
            }
        }
    }

    /// Next sequence for `group`, blocking until one is published.
    ///
    /// Returns `None` when the worker should exit: immediately after a halt,
    /// or once the ring has stopped accepting and the group has taken every
    /// claimed sequence.
    pub(crate) fn next_for(&self, group: usize) -> Option<u64> {
        let mut state = lock(&self.state);
        loop {
            if state.halted {
                return None;
            }
            let sequence = state.group_cursors[group];
            let idx = self.index(sequence);
            if state.slot_sequence[idx] == Some(sequence) {
                state.group_cursors[group] = sequence + 1;
                if !state.vacant[idx] {
                    return Some(sequence);
                }
                state.pending[idx] -= 1;
                if state.pending[idx] == 0 {
                    state.vacant[idx] = false;
                    self.space.notify_all();
                }
                continue;
            }
            if !state.accepting && sequence >= state.next_claim {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Exclusive access to the slot holding `sequence`.
    pub(crate) fn slot(&self, sequence: u64) -> MutexGuard<'_, E> {
        lock(&self.slots[self.index(sequence)])
    }

    /// Mark `sequence` done for one worker group. The last group to finish
    /// clears the slot and frees it for the producer.
    pub(crate) fn release(&self, sequence: u64) {
        let idx = self.index(sequence);
        {
            let mut state = lock(&self.state);
            if state.pending[idx] > 1 {
                state.pending[idx] -= 1;
                return;
            }
        }

        // Still counted as pending while clearing, so no producer can touch
        // the slot. Clearing may close a channel, which can block on I/O, so
        // it runs outside the cursor lock.
        lock(&self.slots[idx]).clear();

        lock(&self.state).pending[idx] = 0;
        self.metrics.record_processed();
        self.space.notify_all();
    }

    /// Stop accepting new events. Claimed sequences are still delivered.
    pub(crate) fn close(&self) {
        lock(&self.state).accepting = false;
        self.available.notify_all();
        self.space.notify_all();
    }

    /// Stop everything: workers exit after their current event and blocked
    /// producers give up.
    pub(crate) fn halt(&self) {
        {
            let mut state = lock(&self.state);
            state.accepting = false;
            state.halted = true;
        }
        self.available.notify_all();
        self.space.notify_all();
    }

    pub(crate) fn is_accepting(&self) -> bool {
        lock(&self.state).accepting
    }

    /// Clear every slot still holding an event. Only called once all
    /// workers have exited. Returns the number of events dropped.
    pub(crate) fn clear_abandoned(&self) -> usize {
        let mut state = lock(&self.state);
        let mut abandoned = 0;
        for (idx, slot) in self.slots.iter().enumerate() {
            let mut slot = lock(slot);
            if !slot.is_clear() {
                slot.clear();
                abandoned += 1;
            }
            state.pending[idx] = 0;
            state.vacant[idx] = false;
        }
        drop(state);
        self.metrics.record_abandoned(abandoned as u64);
        abandoned
    }
}
