//! Read-only scheduler views.

use serde::Serialize;

use super::job::{Job, JobId};

/// Queue snapshot returned by [`super::Scheduler::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub paused: bool,
    pub max_concurrent: usize,
    /// Jobs waiting for a worker.
    pub queued: usize,
    /// Jobs currently held by a worker.
    pub active: usize,
    pub active_job_ids: Vec<JobId>,
    /// Failed jobs waiting out their retry delay.
    pub backing_off: usize,
}

/// Result of [`super::Scheduler::withdraw`].
#[derive(Debug, Clone, PartialEq)]
pub enum Withdrawal {
    /// Removed from the queue before it ran.
    Queued(Job),
    /// Removed while waiting out a retry delay.
    BackingOff(Job),
    /// Running; its abort token has been set.
    Running,
    /// Unknown, finished, or already withdrawn.
    NotFound,
}

impl Withdrawal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Withdrawal::Queued(_) => "queued",
            Withdrawal::BackingOff(_) => "backing_off",
            Withdrawal::Running => "running",
            Withdrawal::NotFound => "not_found",
        }
    }
}
