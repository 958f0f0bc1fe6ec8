//! Applying a handler's result to the job: complete, requeue, back off, or fail.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::unix_timestamp;
use crate::retry::{ErrorKind, RetryDecision};

use super::handler::{JobError, JobOutcome};
use super::job::{Job, JobId, JobStatus};
use super::{Inner, State};

pub(super) fn finish(inner: &Arc<Inner>, mut job: Job, result: Result<JobOutcome, JobError>) {
    let mut st = inner.lock_state();
    st.running.remove(&job.id);
    match result {
        Ok(JobOutcome::Completed) => {
            job.status = JobStatus::Completed;
            job.completed_at = Some(unix_timestamp());
            job.last_error = None;
            tracing::info!(job_id = job.id, "job completed");
            st.finished.insert(job.id, job);
        }
        Ok(JobOutcome::Deferred) => {
            job.status = JobStatus::Pending;
            tracing::info!(job_id = job.id, "job deferred by pause, back in queue");
            st.queue.push_with_seq(job);
        }
        Ok(JobOutcome::Withdrawn) => {
            tracing::info!(job_id = job.id, "job withdrawn by its handler");
        }
        Err(err) => {
            job.last_error = Some(err.message.clone());
            let policy = inner.policy.with_max_retries(job.max_retries);
            match policy.decide(job.retry_count, err.kind) {
                RetryDecision::RetryAfter(delay) => {
                    job.retry_count += 1;
                    job.status = JobStatus::Pending;
                    tracing::warn!(
                        job_id = job.id,
                        retry = job.retry_count,
                        max_retries = job.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed: {}; retrying after backoff",
                        err.message
                    );
                    let id = job.id;
                    st.backing_off.insert(id, job);
                    tokio::spawn(backoff(Arc::clone(inner), id, delay));
                }
                RetryDecision::NoRetry => record_failure(&mut st, job, &err),
            }
        }
    }
}

/// Fail a job whose kind has no handler. Logged at error level once per kind.
pub(super) fn fail_unknown_kind(inner: &Arc<Inner>, job: Job) {
    let mut st = inner.lock_state();
    st.running.remove(&job.id);
    if st.warned_kinds.insert(job.kind.clone()) {
        tracing::error!(kind = %job.kind, "no handler registered for job kind");
    }
    let err = JobError::fatal(format!("no handler registered for job kind {}", job.kind));
    let mut job = job;
    job.status = JobStatus::Failed;
    job.completed_at = Some(unix_timestamp());
    job.last_error = Some(err.message);
    st.finished.insert(job.id, job);
}

fn record_failure(st: &mut State, mut job: Job, err: &JobError) {
    job.status = JobStatus::Failed;
    job.completed_at = Some(unix_timestamp());
    match err.kind {
        ErrorKind::Fatal => tracing::error!(job_id = job.id, "job failed: {}", err.message),
        ErrorKind::Cancelled => tracing::info!(job_id = job.id, "job cancelled"),
        _ => tracing::warn!(
            job_id = job.id,
            retries = job.retry_count,
            "job failed for good: {}",
            err.message
        ),
    }
    st.finished.insert(job.id, job);
}

/// Wait `delay` (or until shutdown), then move the job back into the queue
/// with a fresh sequence. A job withdrawn meanwhile is no longer in
/// `backing_off` and is left alone.
async fn backoff(inner: Arc<Inner>, job_id: JobId, delay: Duration) {
    let stopping = inner.stopping.notified();
    tokio::pin!(stopping);
    stopping.as_mut().enable();
    if !inner.is_shut_down() {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut stopping => {
                tracing::debug!(job_id, "backoff cut short by shutdown");
            }
        }
    }

    let mut st = inner.lock_state();
    if let Some(job) = st.backing_off.remove(&job_id) {
        st.queue.push(job);
    }
    drop(st);
    inner.notify_all();
}
