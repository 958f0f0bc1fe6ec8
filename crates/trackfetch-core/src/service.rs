//! Job submission API for downloads.
//!
//! [`DownloadService`] creates Download records, submits the matching jobs to
//! the [`Scheduler`], and implements per-item pause/resume/cancel/retry on top
//! of [`Scheduler::withdraw`]. It only mutates a Download itself while the
//! record's job is provably not running (queued, backing off, or gone).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{bail, Context, Result};

use crate::clock::unix_timestamp;
use crate::config::MAX_CONCURRENT_LIMIT;
use crate::control::AbortReason;
use crate::download::{Download, DownloadEvent, DownloadId, DownloadPayload, DownloadStatus};
use crate::scheduler::{JobId, JobKind, JobRequest, JobStatus, QueueStatus, Scheduler, Withdrawal};
use crate::store::DownloadStore;

/// What a per-item request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemAction {
    /// The record was updated directly.
    Applied,
    /// The job is running; its worker was signalled and will update the record.
    Signalled,
}

pub struct DownloadService {
    scheduler: Scheduler,
    store: Arc<dyn DownloadStore>,
    max_retries: u32,
    tracked: Mutex<HashMap<DownloadId, JobId>>,
}

impl DownloadService {
    /// The caller registers a handler for [`JobKind::DOWNLOAD`] on `scheduler`.
    pub fn new(scheduler: Scheduler, store: Arc<dyn DownloadStore>, max_retries: u32) -> Self {
        Self {
            scheduler,
            store,
            max_retries,
            tracked: Mutex::new(HashMap::new()),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn tracked(&self) -> std::sync::MutexGuard<'_, HashMap<DownloadId, JobId>> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(&self, d: &Download) -> Result<JobId> {
        self.prune_finished();
        let payload = serde_json::to_value(DownloadPayload {
            download_id: d.id.clone(),
            track_id: d.track_id.clone(),
        })?;
        // Job retries cover only what the record has left.
        let request = JobRequest::new(JobKind::DOWNLOAD, payload)
            .with_priority(d.priority)
            .with_max_retries(d.max_retries.saturating_sub(d.retry_count));
        let job_id = self.scheduler.enqueue(request)?;
        self.tracked().insert(d.id.clone(), job_id);
        tracing::debug!(download_id = %d.id, job_id, priority = d.priority, "download submitted");
        Ok(job_id)
    }

    fn is_live(&self, job_id: JobId) -> bool {
        matches!(
            self.scheduler.job(job_id),
            Some(job) if matches!(job.status, JobStatus::Pending | JobStatus::Running)
        )
    }

    /// Job currently responsible for `id`, if it is still queued, running, or backing off.
    fn live_job(&self, id: &str) -> Option<JobId> {
        let mut tracked = self.tracked();
        let job_id = *tracked.get(id)?;
        if self.is_live(job_id) {
            return Some(job_id);
        }
        tracked.remove(id);
        self.scheduler.forget(job_id);
        None
    }

    /// Stop tracking downloads whose jobs have finished, and let the
    /// scheduler drop their records.
    fn prune_finished(&self) {
        let mut tracked = self.tracked();
        let before = tracked.len();
        tracked.retain(|_, job_id| {
            if self.is_live(*job_id) {
                return true;
            }
            self.scheduler.forget(*job_id);
            false
        });
        let pruned = before - tracked.len();
        if pruned > 0 {
            tracing::debug!(pruned, "forgot finished download jobs");
        }
    }

    async fn load(&self, id: &str) -> Result<Download> {
        self.store
            .load(id)
            .await?
            .with_context(|| format!("download {id} not found"))
    }

    async fn apply(&self, mut d: Download, event: DownloadEvent) -> Result<Download> {
        d.apply(event, unix_timestamp())?;
        self.store.save(&d).await?;
        Ok(d)
    }

    /// Create a Pending download for `track_id` and queue it.
    pub async fn enqueue_download(&self, track_id: &str, priority: i32) -> Result<DownloadId> {
        let d = Download::new(track_id, priority, self.max_retries, unix_timestamp());
        self.store.save(&d).await?;
        self.submit(&d)?;
        tracing::info!(download_id = %d.id, track_id, priority, "download queued");
        Ok(d.id)
    }

    /// Queue one download per track, all at `priority`, in input order.
    pub async fn enqueue_batch(&self, track_ids: &[String], priority: i32) -> Result<Vec<DownloadId>> {
        let mut ids = Vec::with_capacity(track_ids.len());
        for track_id in track_ids {
            ids.push(self.enqueue_download(track_id, priority).await?);
        }
        Ok(ids)
    }

    /// Submit persisted Pending downloads that have no job yet (e.g. after a restart).
    /// Returns how many were queued.
    pub async fn requeue_persisted(&self) -> Result<usize> {
        let pending = self.store.list_by_status(DownloadStatus::Pending).await?;
        let mut queued = 0;
        for d in pending {
            if self.live_job(&d.id).is_some() {
                continue;
            }
            self.submit(&d)?;
            queued += 1;
        }
        if queued > 0 {
            tracing::info!(queued, "requeued persisted downloads");
        }
        Ok(queued)
    }

    pub fn pause(&self) {
        self.scheduler.pause();
    }

    /// Resume the scheduler. Downloads parked as Paused by a global pause (their
    /// jobs are back in the queue) go back to Pending first.
    pub async fn resume(&self) -> Result<()> {
        let deferred: Vec<DownloadId> = {
            let tracked = self.tracked();
            tracked
                .iter()
                .filter(|(_, job_id)| self.scheduler.is_queued(**job_id))
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in deferred {
            let d = self.load(&id).await?;
            if d.status == DownloadStatus::Paused {
                self.apply(d, DownloadEvent::Resume).await?;
            }
        }
        self.scheduler.resume();
        Ok(())
    }

    pub fn status(&self) -> QueueStatus {
        self.scheduler.status()
    }

    pub fn set_max_concurrent(&self, n: usize) -> Result<()> {
        if !(1..=MAX_CONCURRENT_LIMIT).contains(&n) {
            bail!("max concurrent downloads must be between 1 and {MAX_CONCURRENT_LIMIT}, got {n}");
        }
        self.scheduler.set_max_concurrent(n);
        Ok(())
    }

    /// Withdraw the download's job for `reason`. `None` when it has no job in custody.
    fn withdraw(&self, id: &str, reason: AbortReason) -> Option<Withdrawal> {
        let job_id = *self.tracked().get(id)?;
        let withdrawal = self.scheduler.withdraw(job_id, reason);
        match withdrawal {
            Withdrawal::Running => {}
            Withdrawal::Queued(_) | Withdrawal::BackingOff(_) | Withdrawal::NotFound => {
                self.tracked().remove(id);
            }
        }
        Some(withdrawal)
    }

    /// Cancel a download: fail it with "cancelled by user" without using a retry.
    pub async fn cancel(&self, id: &str) -> Result<ItemAction> {
        if let Some(Withdrawal::Running) = self.withdraw(id, AbortReason::Cancel) {
            tracing::info!(download_id = id, "cancel signalled to running download");
            return Ok(ItemAction::Signalled);
        }
        let d = self.load(id).await?;
        if d.status.is_active() {
            bail!("download {id} is {} but has no running job", d.status);
        }
        self.apply(d, DownloadEvent::Cancel).await?;
        tracing::info!(download_id = id, "download cancelled");
        Ok(ItemAction::Applied)
    }

    /// Park one download in Paused until [`DownloadService::resume_download`].
    pub async fn pause_download(&self, id: &str) -> Result<ItemAction> {
        if let Some(Withdrawal::Running) = self.withdraw(id, AbortReason::Pause) {
            tracing::info!(download_id = id, "pause signalled to running download");
            return Ok(ItemAction::Signalled);
        }
        let d = self.load(id).await?;
        if d.status == DownloadStatus::Paused {
            return Ok(ItemAction::Applied);
        }
        if d.status != DownloadStatus::Pending {
            bail!("download {id} is {} and cannot be paused", d.status);
        }
        self.apply(d, DownloadEvent::Pause).await?;
        tracing::info!(download_id = id, "download paused");
        Ok(ItemAction::Applied)
    }

    pub async fn resume_download(&self, id: &str) -> Result<()> {
        let d = self.load(id).await?;
        if d.status != DownloadStatus::Paused {
            bail!("download {id} is {}, not paused", d.status);
        }
        if let Some(job_id) = self.live_job(id) {
            if !self.scheduler.is_paused() {
                bail!("download {id} is still held by job {job_id}");
            }
        }
        let d = self.apply(d, DownloadEvent::Resume).await?;
        if self.live_job(id).is_none() {
            self.submit(&d)?;
        }
        tracing::info!(download_id = id, "download resumed");
        Ok(())
    }

    /// Re-queue a failed download that still has retries left.
    pub async fn retry_download(&self, id: &str) -> Result<()> {
        let d = self.load(id).await?;
        if d.status != DownloadStatus::Failed {
            bail!("download {id} is {}, not failed", d.status);
        }
        if !d.can_retry() {
            bail!("download {id} has exhausted its retries");
        }
        if let Some(job_id) = self.live_job(id) {
            if self.scheduler.reclaim(job_id).is_none() {
                bail!("download {id} is being worked on by job {job_id}");
            }
            tracing::debug!(download_id = id, job_id, "retry replaces waiting job");
        }
        let d = self.apply(d, DownloadEvent::Retry).await?;
        self.submit(&d)?;
        tracing::info!(download_id = id, retry_count = d.retry_count, "download re-queued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{DownloadHandler, HandlerSettings, CANCELLED_MESSAGE};
    use crate::matching::{Candidate, MatchConstraints, WantedTrack};
    use crate::retry::RetryPolicy;
    use crate::store::LibraryDb;
    use crate::testing::{FakePost, FakeSource, FakeTransfer};
    use std::time::Duration;

    struct Rig {
        db: LibraryDb,
        service: DownloadService,
        transfer: Arc<FakeTransfer>,
    }

    async fn rig(source: FakeSource, transfer: FakeTransfer, max_concurrent: usize) -> Rig {
        let db = LibraryDb::open_memory().await.unwrap();
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        };
        let scheduler = Scheduler::new(policy, max_concurrent);
        let transfer = Arc::new(transfer);
        let handler = DownloadHandler::new(
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            Arc::new(source),
            transfer.clone(),
            Arc::new(FakePost::default()),
            HandlerSettings {
                constraints: MatchConstraints::default(),
                search_timeout: Duration::from_millis(200),
                search_grace: Duration::from_millis(100),
                poll_interval: Duration::from_millis(5),
                stall_timeout: Duration::from_secs(5),
            },
        );
        scheduler.register_handler(JobKind::DOWNLOAD, Arc::new(handler));
        let service = DownloadService::new(scheduler, Arc::new(db.clone()), 3);
        Rig {
            db,
            service,
            transfer,
        }
    }

    fn flac() -> Vec<Candidate> {
        vec![Candidate::new("alice", "Artist - Title.flac").with_bitrate(1000)]
    }

    async fn track(db: &LibraryDb) -> String {
        db.add_track(&WantedTrack::new("Artist", "Title")).await.unwrap()
    }

    async fn idle(s: &DownloadService) {
        tokio::time::timeout(Duration::from_secs(5), s.scheduler().wait_idle())
            .await
            .expect("scheduler went idle");
    }

    async fn stored(db: &LibraryDb, id: &str) -> Download {
        db.load(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn enqueued_download_completes() {
        let r = rig(FakeSource::offering(flac()), FakeTransfer::default(), 2).await;
        let t = track(&r.db).await;
        let id = r.service.enqueue_download(&t, 5).await.unwrap();
        assert_eq!(stored(&r.db, &id).await.status, DownloadStatus::Pending);

        r.service.scheduler().start(2);
        idle(&r.service).await;
        let d = stored(&r.db, &id).await;
        assert_eq!(d.status, DownloadStatus::Completed);
        assert_eq!(d.priority, 5);
    }

    #[tokio::test]
    async fn finished_jobs_are_forgotten_on_next_submit() {
        let r = rig(FakeSource::offering(flac()), FakeTransfer::default(), 1).await;
        let t = track(&r.db).await;
        let first = r.service.enqueue_download(&t, 0).await.unwrap();
        let first_job = *r.service.tracked().get(&first).unwrap();
        r.service.scheduler().start(1);
        idle(&r.service).await;
        assert_eq!(stored(&r.db, &first).await.status, DownloadStatus::Completed);
        assert!(r.service.scheduler().job(first_job).is_some());

        r.service.pause();
        let second = r.service.enqueue_download(&t, 0).await.unwrap();
        let tracked = r.service.tracked().clone();
        assert_eq!(tracked.len(), 1);
        assert!(tracked.contains_key(&second));
        assert!(r.service.scheduler().job(first_job).is_none());
    }

    #[tokio::test]
    async fn four_failures_leave_retry_count_four() {
        let r = rig(FakeSource::offering(Vec::new()), FakeTransfer::default(), 1).await;
        let t = track(&r.db).await;
        let id = r.service.enqueue_download(&t, 0).await.unwrap();
        r.service.scheduler().start(1);
        idle(&r.service).await;

        let d = stored(&r.db, &id).await;
        assert_eq!(d.status, DownloadStatus::Failed);
        assert_eq!(d.retry_count, 4);
        assert!(d.is_exhausted());
        assert!(r.service.retry_download(&id).await.is_err());
    }

    #[tokio::test]
    async fn batch_keeps_order_within_priority() {
        let r = rig(FakeSource::offering(flac()), FakeTransfer::default(), 1).await;
        let tracks = vec![track(&r.db).await, track(&r.db).await, track(&r.db).await];
        let ids = r.service.enqueue_batch(&tracks, 1).await.unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(r.service.status().queued, 3);

        r.service.scheduler().start(1);
        idle(&r.service).await;
        let mut started = Vec::new();
        for id in &ids {
            let d = stored(&r.db, id).await;
            assert_eq!(d.status, DownloadStatus::Completed);
            started.push(d.started_at);
        }
        assert!(started.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn cancel_queued_download_marks_it_failed() {
        let r = rig(FakeSource::offering(flac()), FakeTransfer::default(), 1).await;
        let t = track(&r.db).await;
        let id = r.service.enqueue_download(&t, 0).await.unwrap();

        assert_eq!(r.service.cancel(&id).await.unwrap(), ItemAction::Applied);
        assert_eq!(r.service.status().queued, 0);
        let d = stored(&r.db, &id).await;
        assert_eq!(d.status, DownloadStatus::Failed);
        assert_eq!(d.error_message.as_deref(), Some(CANCELLED_MESSAGE));
        assert_eq!(d.retry_count, 0);

        r.service.retry_download(&id).await.unwrap();
        r.service.scheduler().start(1);
        idle(&r.service).await;
        assert_eq!(stored(&r.db, &id).await.status, DownloadStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_running_download_signals_worker() {
        let r = rig(FakeSource::offering(flac()), FakeTransfer::endless(), 1).await;
        let t = track(&r.db).await;
        let id = r.service.enqueue_download(&t, 0).await.unwrap();
        r.service.scheduler().start(1);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(stored(&r.db, &id).await.status, DownloadStatus::Downloading);

        assert_eq!(r.service.cancel(&id).await.unwrap(), ItemAction::Signalled);
        idle(&r.service).await;
        let d = stored(&r.db, &id).await;
        assert_eq!(d.status, DownloadStatus::Failed);
        assert_eq!(d.error_message.as_deref(), Some(CANCELLED_MESSAGE));
        assert_eq!(d.retry_count, 0);
        assert_eq!(r.transfer.cancels.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pause_and_resume_single_download() {
        let r = rig(FakeSource::offering(flac()), FakeTransfer::default(), 1).await;
        let t = track(&r.db).await;
        let id = r.service.enqueue_download(&t, 0).await.unwrap();

        assert_eq!(r.service.pause_download(&id).await.unwrap(), ItemAction::Applied);
        assert_eq!(stored(&r.db, &id).await.status, DownloadStatus::Paused);
        r.service.scheduler().start(1);
        idle(&r.service).await;
        assert_eq!(stored(&r.db, &id).await.status, DownloadStatus::Paused);

        r.service.resume_download(&id).await.unwrap();
        idle(&r.service).await;
        assert_eq!(stored(&r.db, &id).await.status, DownloadStatus::Completed);
    }

    #[tokio::test]
    async fn global_pause_holds_everything_until_resume() {
        let r = rig(FakeSource::offering(flac()), FakeTransfer::default(), 2).await;
        r.service.pause();
        let t = track(&r.db).await;
        let id = r.service.enqueue_download(&t, 0).await.unwrap();
        r.service.scheduler().start(2);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(stored(&r.db, &id).await.status, DownloadStatus::Pending);
        assert!(r.service.status().paused);

        r.service.resume().await.unwrap();
        idle(&r.service).await;
        assert_eq!(stored(&r.db, &id).await.status, DownloadStatus::Completed);
    }

    #[tokio::test]
    async fn requeue_persisted_skips_tracked_downloads() {
        let r = rig(FakeSource::offering(flac()), FakeTransfer::default(), 1).await;
        let t = track(&r.db).await;
        r.service.enqueue_download(&t, 0).await.unwrap();
        let orphan = Download::new(t.clone(), 3, 3, unix_timestamp());
        r.db.save(&orphan).await.unwrap();

        assert_eq!(r.service.requeue_persisted().await.unwrap(), 1);
        assert_eq!(r.service.requeue_persisted().await.unwrap(), 0);
        assert_eq!(r.service.status().queued, 2);
    }

    #[tokio::test]
    async fn set_max_concurrent_is_bounded() {
        let r = rig(FakeSource::offering(flac()), FakeTransfer::default(), 1).await;
        assert!(r.service.set_max_concurrent(0).is_err());
        assert!(r.service.set_max_concurrent(11).is_err());
        r.service.set_max_concurrent(4).unwrap();
        assert_eq!(r.service.status().max_concurrent, 4);
    }

    #[tokio::test]
    async fn unknown_download_is_an_error() {
        let r = rig(FakeSource::offering(flac()), FakeTransfer::default(), 1).await;
        assert!(r.service.cancel("missing").await.is_err());
        assert!(r.service.pause_download("missing").await.is_err());
        assert!(r.service.retry_download("missing").await.is_err());
    }
}
