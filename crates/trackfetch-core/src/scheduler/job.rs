//! Job types owned by the scheduler.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Scheduler-assigned job identifier, increasing from 1.
pub type JobId = u64;

/// Discriminator that selects the registered handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKind(Cow<'static, str>);

impl JobKind {
    /// Track download jobs, handled by [`crate::download::DownloadHandler`].
    pub const DOWNLOAD: JobKind = JobKind(Cow::Borrowed("download"));

    pub fn new(kind: impl Into<String>) -> Self {
        JobKind(Cow::Owned(kind.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job lifecycle as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Queued or waiting out a backoff.
    Pending,
    Running,
    Completed,
    /// Failed without a retry left (or with a non-retryable error).
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// A unit of schedulable work. Handlers get a read-only view; only the
/// scheduler changes `status` and `retry_count`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    /// Higher runs first.
    pub priority: i32,
    pub status: JobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Message of the most recent failed attempt.
    pub last_error: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    /// Arrival sequence; FIFO tie-break between equal priorities.
    #[serde(skip)]
    pub(crate) seq: u64,
}

/// What a caller submits to [`super::Scheduler::enqueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub priority: i32,
    /// Overrides the scheduler's retry policy for this job.
    pub max_retries: Option<u32>,
}

impl JobRequest {
    pub fn new(kind: JobKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload,
            priority: 0,
            max_retries: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}
