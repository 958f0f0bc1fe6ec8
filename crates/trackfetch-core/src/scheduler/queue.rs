//! Priority queue of pending jobs.
//!
//! Binary heap keyed by `(priority, Reverse(seq))`: highest priority first,
//! lowest arrival sequence first among equals.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use super::job::{Job, JobId};

#[derive(Debug)]
struct Queued(Job);

impl Queued {
    fn key(&self) -> (i32, Reverse<u64>) {
        (self.0.priority, Reverse(self.0.seq))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

#[derive(Debug, Default)]
pub(crate) struct JobQueue {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
}

impl JobQueue {
    /// Push with a fresh arrival sequence.
    pub(crate) fn push(&mut self, mut job: Job) {
        job.seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Queued(job));
    }

    /// Push keeping `job.seq` (a deferred job goes back to its original place).
    pub(crate) fn push_with_seq(&mut self, job: Job) {
        self.heap.push(Queued(job));
    }

    pub(crate) fn pop(&mut self) -> Option<Job> {
        self.heap.pop().map(|q| q.0)
    }

    pub(crate) fn remove(&mut self, id: JobId) -> Option<Job> {
        let mut removed = None;
        self.heap.retain(|q| {
            if removed.is_none() && q.0.id == id {
                removed = Some(q.0.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub(crate) fn get(&self, id: JobId) -> Option<&Job> {
        self.heap.iter().map(|q| &q.0).find(|j| j.id == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
