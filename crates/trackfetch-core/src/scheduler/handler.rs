//! Job handler contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::control::{AbortReason, AbortToken};
use crate::retry::{classify, DownloadError, ErrorKind};

use super::job::{Job, JobId};

/// Successful ways a handler can hand a job back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The work is done.
    Completed,
    /// A global pause landed before the job committed to a transfer; re-queue
    /// it in its original position.
    Deferred,
    /// The job stopped on a per-item pause request; the scheduler drops it and
    /// the caller re-submits on resume.
    Withdrawn,
}

/// Failed attempt, classified for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }
}

impl From<DownloadError> for JobError {
    fn from(e: DownloadError) -> Self {
        JobError::new(classify(&e), e.to_string())
    }
}

/// Per-attempt context handed to the handler.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    abort: AbortToken,
    paused: Arc<AtomicBool>,
}

impl JobContext {
    pub(crate) fn new(job_id: JobId, abort: AbortToken, paused: Arc<AtomicBool>) -> Self {
        Self {
            job_id,
            abort,
            paused,
        }
    }

    /// Per-item pause/cancel request for this job, if any.
    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.abort.reason()
    }

    /// True while the scheduler is globally paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

/// Executes jobs of one [`super::JobKind`].
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job, ctx: &JobContext) -> Result<JobOutcome, JobError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_errors_keep_their_classification() {
        let e: JobError = DownloadError::NoSuitableSource.into();
        assert_eq!(e.kind, ErrorKind::NoCandidate);
        assert_eq!(e.message, "no suitable source found");

        let e: JobError = DownloadError::MalformedPayload("bad json".into()).into();
        assert_eq!(e.kind, ErrorKind::Fatal);
    }

    #[test]
    fn context_reports_abort_and_pause() {
        let token = AbortToken::new();
        let paused = Arc::new(AtomicBool::new(false));
        let ctx = JobContext::new(1, token.clone(), Arc::clone(&paused));
        assert!(ctx.abort_reason().is_none());
        assert!(!ctx.is_paused());
        token.request(AbortReason::Cancel);
        paused.store(true, Ordering::Release);
        assert_eq!(ctx.abort_reason(), Some(AbortReason::Cancel));
        assert!(ctx.is_paused());
    }
}
