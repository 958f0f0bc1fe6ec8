//! Job scheduler: priority queue, bounded worker pool, retry with backoff.
//!
//! Jobs are popped highest priority first (FIFO among equals) by a fixed set
//! of worker tasks. Each running job holds a [`SlotGuard`],
//! so at most `max_concurrent` handlers run at once. Failed attempts are
//! classified; retryable ones wait out an exponential backoff in a detached
//! timer task and go back into the queue.
//!
//! Claiming a job and toggling the global pause flag happen under the same
//! lock, so nothing is dequeued after [`Scheduler::pause`] returns.

mod finish;
mod handler;
mod job;
mod queue;
mod slots;
mod status;
mod worker;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::clock::unix_timestamp;
use crate::config::{TrackfetchConfig, MAX_CONCURRENT_LIMIT};
use crate::control::{AbortReason, JobControl};
use crate::retry::RetryPolicy;

pub use handler::{JobContext, JobError, JobHandler, JobOutcome};
pub use job::{Job, JobId, JobKind, JobRequest, JobStatus};
pub use slots::{SlotGuard, WorkerSlots};
pub use status::{QueueStatus, Withdrawal};

use queue::JobQueue;

/// Returned by [`Scheduler::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler is shut down")]
    ShutDown,
}

#[derive(Default)]
struct State {
    queue: JobQueue,
    running: HashMap<JobId, Job>,
    backing_off: HashMap<JobId, Job>,
    finished: HashMap<JobId, Job>,
    /// Kinds already reported as unregistered.
    warned_kinds: HashSet<JobKind>,
}

struct Inner {
    state: Mutex<State>,
    slots: Arc<WorkerSlots>,
    paused: Arc<AtomicBool>,
    started: AtomicBool,
    shutdown: AtomicBool,
    next_id: AtomicU64,
    /// Wakes idle workers (new job, slot freed, resume, shutdown).
    wake: Notify,
    /// Cuts backoff timers short on shutdown.
    stopping: Notify,
    /// Fired whenever the scheduler may have gone idle.
    changed: Notify,
    handlers: RwLock<HashMap<JobKind, Arc<dyn JobHandler>>>,
    control: Arc<JobControl>,
    policy: RetryPolicy,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn handler_for(&self, kind: &JobKind) -> Option<Arc<dyn JobHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .cloned()
    }

    fn is_idle(&self) -> bool {
        let st = self.lock_state();
        st.running.is_empty()
            && st.backing_off.is_empty()
            && (st.queue.is_empty() || self.is_shut_down())
    }

    fn spawn_workers(self: &Arc<Self>, workers: &mut Vec<JoinHandle<()>>, target: usize) {
        while workers.len() < target {
            let index = workers.len();
            workers.push(tokio::spawn(worker::worker_loop(Arc::clone(self), index)));
        }
    }

    fn notify_all(&self) {
        self.wake.notify_waiters();
        self.changed.notify_waiters();
    }
}

/// Owned scheduler handle; clones share the same queue and workers.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// `max_concurrent` is clamped to `1..=MAX_CONCURRENT_LIMIT`.
    pub fn new(policy: RetryPolicy, max_concurrent: usize) -> Self {
        let inner = Inner {
            state: Mutex::new(State::default()),
            slots: Arc::new(WorkerSlots::new(max_concurrent.clamp(1, MAX_CONCURRENT_LIMIT))),
            paused: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            wake: Notify::new(),
            stopping: Notify::new(),
            changed: Notify::new(),
            handlers: RwLock::new(HashMap::new()),
            control: Arc::new(JobControl::new()),
            policy,
            workers: Mutex::new(Vec::new()),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn from_config(cfg: &TrackfetchConfig) -> Self {
        Self::new(
            RetryPolicy::from_config(&cfg.retry_or_default()),
            cfg.max_concurrent_downloads,
        )
    }

    /// Register (or replace) the handler for `kind`.
    pub fn register_handler(&self, kind: JobKind, handler: Arc<dyn JobHandler>) {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, handler);
    }

    /// Queue a job. Fails only after [`Scheduler::stop`].
    pub fn enqueue(&self, request: JobRequest) -> Result<JobId, SchedulerError> {
        let mut st = self.inner.lock_state();
        if self.inner.is_shut_down() {
            return Err(SchedulerError::ShutDown);
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let job = Job {
            id,
            kind: request.kind,
            payload: request.payload,
            priority: request.priority,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: request.max_retries.unwrap_or(self.inner.policy.max_retries),
            last_error: None,
            created_at: unix_timestamp(),
            started_at: None,
            completed_at: None,
            seq: 0,
        };
        tracing::debug!(job_id = id, kind = %job.kind, priority = job.priority, "job enqueued");
        st.queue.push(job);
        drop(st);
        self.inner.wake.notify_waiters();
        Ok(id)
    }

    /// Spawn `worker_count` workers. No-op if already started or shut down.
    pub fn start(&self, worker_count: usize) {
        let mut workers = self
            .inner
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.inner.is_shut_down() || self.inner.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let count = worker_count.clamp(1, MAX_CONCURRENT_LIMIT);
        self.inner.spawn_workers(&mut workers, count);
        tracing::info!(
            workers = count,
            max_concurrent = self.inner.slots.max(),
            "scheduler started"
        );
    }

    /// Graceful, permanent shutdown. Workers finish their current job and
    /// exit; backoff timers end early and return their jobs to the queue.
    pub async fn stop(&self) {
        {
            let _st = self.inner.lock_state();
            self.inner.shutdown.store(true, Ordering::Release);
        }
        self.inner.stopping.notify_waiters();
        self.inner.notify_all();

        let handles = std::mem::take(
            &mut *self
                .inner
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("worker task ended abnormally: {}", e);
            }
        }
        tracing::info!("scheduler stopped");
    }

    /// Stop dequeuing. Jobs already claimed keep running.
    pub fn pause(&self) {
        let _st = self.inner.lock_state();
        self.inner.paused.store(true, Ordering::Release);
        tracing::info!("scheduler paused");
    }

    pub fn resume(&self) {
        {
            let _st = self.inner.lock_state();
            self.inner.paused.store(false, Ordering::Release);
        }
        tracing::info!("scheduler resumed");
        self.inner.wake.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    /// Change the concurrency bound. Running jobs are never interrupted; when
    /// growing past the spawned worker count, extra workers are spawned.
    pub fn set_max_concurrent(&self, n: usize) {
        let n = n.clamp(1, MAX_CONCURRENT_LIMIT);
        self.inner.slots.set_max(n);
        if self.inner.started.load(Ordering::Acquire) && !self.inner.is_shut_down() {
            let mut workers = self
                .inner
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.inner.spawn_workers(&mut workers, n);
        }
        tracing::info!(max_concurrent = n, "concurrency limit changed");
        self.inner.wake.notify_waiters();
    }

    /// Snapshot of the queue; no side effects.
    pub fn status(&self) -> QueueStatus {
        let st = self.inner.lock_state();
        let mut active_job_ids: Vec<JobId> = st.running.keys().copied().collect();
        active_job_ids.sort_unstable();
        QueueStatus {
            paused: self.is_paused(),
            max_concurrent: self.inner.slots.max(),
            queued: st.queue.len(),
            active: st.running.len(),
            active_job_ids,
            backing_off: st.backing_off.len(),
        }
    }

    /// Take a job out of the scheduler's custody. Queued and backing-off jobs
    /// are removed and returned; a running job is signalled through its abort
    /// token and stops at its next checkpoint.
    pub fn withdraw(&self, job_id: JobId, reason: AbortReason) -> Withdrawal {
        let mut st = self.inner.lock_state();
        let withdrawal = if let Some(job) = st.queue.remove(job_id) {
            Withdrawal::Queued(job)
        } else if let Some(job) = st.backing_off.remove(&job_id) {
            Withdrawal::BackingOff(job)
        } else if st.running.contains_key(&job_id) {
            self.inner.control.request_abort(job_id, reason);
            Withdrawal::Running
        } else {
            Withdrawal::NotFound
        };
        drop(st);
        tracing::debug!(job_id, ?reason, outcome = withdrawal.as_str(), "withdraw requested");
        self.inner.changed.notify_waiters();
        withdrawal
    }

    /// Remove a queued or backing-off job; a running job is left alone.
    pub fn reclaim(&self, job_id: JobId) -> Option<Job> {
        let mut st = self.inner.lock_state();
        let job = st
            .queue
            .remove(job_id)
            .or_else(|| st.backing_off.remove(&job_id));
        drop(st);
        self.inner.changed.notify_waiters();
        job
    }

    /// Current view of a job: queued, running, backing off, or finished.
    /// Withdrawn jobs are forgotten.
    pub fn job(&self, job_id: JobId) -> Option<Job> {
        let st = self.inner.lock_state();
        st.running
            .get(&job_id)
            .or_else(|| st.backing_off.get(&job_id))
            .or_else(|| st.queue.get(job_id))
            .or_else(|| st.finished.get(&job_id))
            .cloned()
    }

    /// Drop a finished job's record. Jobs still queued, running, or backing
    /// off are left alone.
    pub fn forget(&self, job_id: JobId) -> Option<Job> {
        self.inner.lock_state().finished.remove(&job_id)
    }

    /// True when the job sits in the queue (not running, not backing off).
    pub fn is_queued(&self, job_id: JobId) -> bool {
        self.inner.lock_state().queue.get(job_id).is_some()
    }

    /// Resolves once nothing is running or backing off and the queue is empty
    /// (or the scheduler is shut down).
    pub async fn wait_idle(&self) {
        loop {
            let changed = self.inner.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            if self.inner.is_idle() {
                return;
            }
            changed.await;
        }
    }

    /// Abort-token registry for running jobs.
    pub fn control(&self) -> Arc<JobControl> {
        Arc::clone(&self.inner.control)
    }
}
