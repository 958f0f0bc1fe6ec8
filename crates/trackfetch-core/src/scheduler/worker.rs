//! Worker task: claim, run, report.

use std::any::Any;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::Instrument;

use crate::clock::unix_timestamp;
use crate::control::AbortToken;

use super::finish;
use super::handler::{JobContext, JobError};
use super::job::{Job, JobStatus};
use super::slots::SlotGuard;
use super::Inner;

pub(super) async fn worker_loop(inner: Arc<Inner>, index: usize) {
    tracing::debug!(worker = index, "worker started");
    loop {
        let notified = inner.wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if inner.is_shut_down() {
            break;
        }
        match claim(&inner) {
            Some((job, token, slot)) => run_job(&inner, job, token, slot).await,
            None => notified.await,
        }
    }
    tracing::debug!(worker = index, "worker exiting");
}

/// Pop the next job if not paused and a slot is free. Runs under the state
/// lock, so it is atomic with respect to `pause()` and `withdraw()`.
fn claim(inner: &Arc<Inner>) -> Option<(Job, AbortToken, SlotGuard)> {
    let mut st = inner.lock_state();
    if inner.paused.load(Ordering::Acquire) || st.queue.is_empty() {
        return None;
    }
    let slot = inner.slots.try_acquire()?;
    let mut job = st.queue.pop()?;
    job.status = JobStatus::Running;
    job.started_at = Some(unix_timestamp());
    let token = inner.control.register(job.id);
    st.running.insert(job.id, job.clone());
    Some((job, token, slot))
}

async fn run_job(inner: &Arc<Inner>, job: Job, token: AbortToken, slot: SlotGuard) {
    let span = tracing::info_span!(
        "job",
        job_id = job.id,
        kind = %job.kind,
        priority = job.priority,
        attempt = job.retry_count + 1
    );

    let result = match inner.handler_for(&job.kind) {
        None => {
            inner.control.unregister(job.id);
            finish::fail_unknown_kind(inner, job);
            drop(slot);
            inner.notify_all();
            return;
        }
        Some(handler) => {
            let ctx = JobContext::new(job.id, token, Arc::clone(&inner.paused));
            let view = job.clone();
            // A separate task so a panicking handler surfaces as a JoinError.
            let task = tokio::spawn(
                async move { handler.handle(&view, &ctx).await }.instrument(span.clone()),
            );
            match task.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(JobError::fatal(format!(
                    "handler panicked: {}",
                    panic_message(e.into_panic())
                ))),
                Err(e) => Err(JobError::fatal(format!("handler task failed: {e}"))),
            }
        }
    };

    inner.control.unregister(job.id);
    span.in_scope(|| finish::finish(inner, job, result));
    drop(slot);
    inner.notify_all();
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
