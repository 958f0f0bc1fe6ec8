//! Worker slot budget shared by all workers.
//!
//! Each running job holds one slot; the number of slots in use never exceeds
//! `max`. Lowering `max` never revokes slots already held.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct WorkerSlots {
    max: AtomicUsize,
    in_use: AtomicUsize,
}

impl WorkerSlots {
    pub fn new(max: usize) -> Self {
        Self {
            max: AtomicUsize::new(max.max(1)),
            in_use: AtomicUsize::new(0),
        }
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::Acquire)
    }

    pub fn set_max(&self, max: usize) {
        self.max.store(max.max(1), Ordering::Release);
    }

    /// Number of slots currently held.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Free slots (may be 0, including after `set_max` shrank below `in_use`).
    pub fn available(&self) -> usize {
        self.max().saturating_sub(self.in_use())
    }

    /// Take one slot if `in_use < max`. The slot is released when the guard drops.
    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotGuard> {
        let mut current = self.in_use.load(Ordering::Acquire);
        loop {
            if current >= self.max() {
                return None;
            }
            match self.in_use.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(SlotGuard(Arc::clone(self))),
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self) {
        let _ = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// Releases the held slot when dropped.
#[derive(Debug)]
pub struct SlotGuard(Arc<WorkerSlots>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}
