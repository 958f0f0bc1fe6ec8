//! In-crate fakes for the collaborator traits.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::control::AbortToken;
use crate::download::Download;
use crate::matching::{Candidate, WantedTrack};
use crate::postprocess::PostProcessor;
use crate::retry::DownloadError;
use crate::scheduler::{Job, JobContext, JobKind, JobStatus};
use crate::source::CandidateSource;
use crate::transfer::{TransferBackend, TransferHandle, TransferProgress, TransferState};

/// Returns the same offers every time, optionally after a delay or a few failures.
pub(crate) struct FakeSource {
    pub offers: Vec<Candidate>,
    pub delay: Duration,
    pub failures_left: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FakeSource {
    pub fn offering(offers: Vec<Candidate>) -> Self {
        Self {
            offers,
            delay: Duration::ZERO,
            failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl CandidateSource for FakeSource {
    async fn search(&self, _query: &str, _timeout: Duration) -> Result<Vec<Candidate>, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DownloadError::PeerUnavailable("connection refused".into()));
        }
        Ok(self.offers.clone())
    }
}

/// Reports progress in 50% steps, then succeeds (or fails when `fail_with` is set).
#[derive(Default)]
pub(crate) struct FakeTransfer {
    pub started: Mutex<Vec<Candidate>>,
    pub polls: AtomicU32,
    pub cancels: AtomicUsize,
    pub fail_with: Option<String>,
    /// Keep reporting progress forever.
    pub never_finish: AtomicBool,
    /// Every poll errors as if the peer API were down.
    pub poll_errors: bool,
    /// Every poll reports the transfer still waiting in the remote queue.
    pub stuck_queued: bool,
}

impl FakeTransfer {
    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn endless() -> Self {
        let t = Self::default();
        t.never_finish.store(true, Ordering::SeqCst);
        t
    }

    pub fn unpollable() -> Self {
        Self {
            poll_errors: true,
            ..Self::default()
        }
    }

    pub fn stuck_in_queue() -> Self {
        Self {
            stuck_queued: true,
            ..Self::default()
        }
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<Candidate> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransferBackend for FakeTransfer {
    async fn start_transfer(&self, candidate: &Candidate) -> Result<TransferHandle, DownloadError> {
        self.started.lock().unwrap().push(candidate.clone());
        Ok(TransferHandle {
            peer: candidate.peer.clone(),
            filename: candidate.filename.clone(),
            id: Some("t-1".into()),
        })
    }

    async fn poll(&self, _handle: &TransferHandle) -> Result<TransferProgress, DownloadError> {
        let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.poll_errors {
            return Err(DownloadError::PeerUnavailable("HTTP 502".into()));
        }
        if self.stuck_queued {
            return Ok(TransferProgress::from_bytes(0, 100, None, TransferState::Queued));
        }
        if self.never_finish.load(Ordering::SeqCst) {
            return Ok(TransferProgress::from_bytes(
                u64::from(n.min(99)),
                100,
                Some(1024),
                TransferState::InProgress,
            ));
        }
        let state = match (n, &self.fail_with) {
            (1, _) => TransferState::InProgress,
            (_, Some(reason)) => TransferState::Failed(reason.clone()),
            _ => TransferState::Succeeded,
        };
        let done = if n == 1 { 50 } else { 100 };
        Ok(TransferProgress::from_bytes(done, 100, Some(2048), state))
    }

    async fn cancel(&self, _handle: &TransferHandle) -> Result<(), DownloadError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Post-processor that fails when asked to.
#[derive(Default)]
pub(crate) struct FakePost {
    pub fail: bool,
    pub processed: AtomicUsize,
}

#[async_trait]
impl PostProcessor for FakePost {
    async fn process(&self, _download: &Download, _track: &WantedTrack) -> anyhow::Result<()> {
        self.processed.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("tagging failed");
        }
        Ok(())
    }
}

pub(crate) fn job_with_payload(payload: serde_json::Value) -> Job {
    Job {
        id: 1,
        kind: JobKind::DOWNLOAD,
        payload,
        priority: 0,
        status: JobStatus::Running,
        retry_count: 0,
        max_retries: 3,
        last_error: None,
        created_at: 0,
        started_at: Some(0),
        completed_at: None,
        seq: 0,
    }
}

pub(crate) fn context() -> (JobContext, AbortToken, Arc<AtomicBool>) {
    let token = AbortToken::new();
    let paused = Arc::new(AtomicBool::new(false));
    let ctx = JobContext::new(1, token.clone(), Arc::clone(&paused));
    (ctx, token, paused)
}
