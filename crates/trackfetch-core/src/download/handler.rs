//! Download job handler: search, select, transfer, post-process.
//!
//! One call drives one attempt of one Download through the state machine,
//! persisting every transition. Failures are recorded on the Download first
//! and then returned so the scheduler can decide on a retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use serde::{Deserialize, Serialize};

use crate::catalog::TrackCatalog;
use crate::clock::unix_timestamp;
use crate::config::TrackfetchConfig;
use crate::control::AbortReason;
use crate::matching::{build_search_query, rank, Candidate, MatchConstraints, WantedTrack};
use crate::postprocess::PostProcessor;
use crate::retry::DownloadError;
use crate::scheduler::{Job, JobContext, JobError, JobHandler, JobOutcome};
use crate::source::CandidateSource;
use crate::store::DownloadStore;
use crate::transfer::{TransferBackend, TransferHandle, TransferState};

use super::record::{Download, DownloadId, DownloadStatus};
use super::state::DownloadEvent;

/// Payload of a `download` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadPayload {
    pub download_id: DownloadId,
    pub track_id: String,
}

/// Extra time a source gets past its own search deadline to deliver the
/// results it collected.
pub const SEARCH_GRACE: Duration = Duration::from_secs(10);

/// Knobs read once from config.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub constraints: MatchConstraints,
    /// Deadline handed to the source.
    pub search_timeout: Duration,
    /// Added to `search_timeout` for the hard guard around the search call.
    pub search_grace: Duration,
    pub poll_interval: Duration,
    /// Longest a transfer may sit without any progress.
    pub stall_timeout: Duration,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self::from_config(&TrackfetchConfig::default())
    }
}

impl HandlerSettings {
    pub fn from_config(cfg: &TrackfetchConfig) -> Self {
        Self {
            constraints: MatchConstraints::from_config(&cfg.matching),
            search_timeout: cfg.peer.search_timeout(),
            search_grace: SEARCH_GRACE,
            poll_interval: cfg.peer.poll_interval(),
            stall_timeout: cfg.peer.stall_timeout(),
        }
    }
}

/// Handler registered for [`crate::scheduler::JobKind::DOWNLOAD`].
pub struct DownloadHandler {
    store: Arc<dyn DownloadStore>,
    catalog: Arc<dyn TrackCatalog>,
    source: Arc<dyn CandidateSource>,
    transfer: Arc<dyn TransferBackend>,
    post: Arc<dyn PostProcessor>,
    settings: HandlerSettings,
}

/// Why the attempt stopped early.
enum Stop {
    Outcome(JobOutcome),
    Error(DownloadError),
}

impl From<DownloadError> for Stop {
    fn from(e: DownloadError) -> Self {
        Stop::Error(e)
    }
}

impl DownloadHandler {
    pub fn new(
        store: Arc<dyn DownloadStore>,
        catalog: Arc<dyn TrackCatalog>,
        source: Arc<dyn CandidateSource>,
        transfer: Arc<dyn TransferBackend>,
        post: Arc<dyn PostProcessor>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            store,
            catalog,
            source,
            transfer,
            post,
            settings,
        }
    }

    async fn save(&self, d: &Download) -> Result<(), DownloadError> {
        self.store.save(d).await.map_err(DownloadError::storage)
    }

    async fn apply(&self, d: &mut Download, event: DownloadEvent) -> Result<(), DownloadError> {
        d.apply(event, unix_timestamp())?;
        self.save(d).await
    }

    /// Record a failure event on the download, then hand the error back.
    async fn fail(&self, d: &mut Download, event: DownloadEvent, err: DownloadError) -> Stop {
        match self.apply(d, event).await {
            Ok(()) => Stop::Error(err),
            Err(store_err) => Stop::Error(store_err),
        }
    }

    async fn load(&self, payload: &DownloadPayload) -> Result<Download, DownloadError> {
        self.store
            .load(&payload.download_id)
            .await
            .map_err(DownloadError::storage)?
            .ok_or_else(|| {
                DownloadError::MalformedPayload(format!(
                    "download {} does not exist",
                    payload.download_id
                ))
            })
    }

    /// Bring the record back to `Pending` so this attempt can start.
    /// Returns `Some` when there is nothing to do.
    async fn make_startable(&self, d: &mut Download) -> Result<Option<JobOutcome>, DownloadError> {
        match d.status {
            DownloadStatus::Pending => Ok(None),
            DownloadStatus::Completed => {
                tracing::info!(download_id = %d.id, "download already completed");
                Ok(Some(JobOutcome::Completed))
            }
            DownloadStatus::Failed if !d.can_retry() => Err(DownloadError::Exhausted(d.id.clone())),
            DownloadStatus::Failed => {
                self.apply(d, DownloadEvent::Retry).await?;
                Ok(None)
            }
            DownloadStatus::Paused => {
                self.apply(d, DownloadEvent::Resume).await?;
                Ok(None)
            }
            DownloadStatus::Searching | DownloadStatus::Downloading | DownloadStatus::Processing => {
                tracing::warn!(
                    download_id = %d.id,
                    status = %d.status,
                    "download left in an active state; restarting it"
                );
                let now = unix_timestamp();
                d.apply(DownloadEvent::Pause, now)?;
                d.apply(DownloadEvent::Resume, now)?;
                self.save(d).await?;
                Ok(None)
            }
        }
    }

    /// Honour a per-item pause or cancel request.
    async fn check_abort(
        &self,
        d: &mut Download,
        ctx: &JobContext,
        transfer: Option<&TransferHandle>,
    ) -> Result<(), Stop> {
        let Some(reason) = ctx.abort_reason() else {
            return Ok(());
        };
        if let Some(handle) = transfer {
            self.cancel_remote(d, handle).await;
        }
        match reason {
            AbortReason::Pause => {
                self.apply(d, DownloadEvent::Pause).await?;
                tracing::info!(download_id = %d.id, "download paused");
                Err(Stop::Outcome(JobOutcome::Withdrawn))
            }
            AbortReason::Cancel => {
                self.apply(d, DownloadEvent::Cancel).await?;
                tracing::info!(download_id = %d.id, "download cancelled");
                Err(Stop::Error(DownloadError::Cancelled))
            }
        }
    }

    /// Best effort: the attempt ends either way.
    async fn cancel_remote(&self, d: &Download, handle: &TransferHandle) {
        if let Err(e) = self.transfer.cancel(handle).await {
            tracing::warn!(download_id = %d.id, "could not cancel remote transfer: {}", e);
        }
    }

    async fn search(&self, d: &mut Download, track: &WantedTrack) -> Result<Vec<Candidate>, Stop> {
        let query = build_search_query(track);
        tracing::debug!(download_id = %d.id, query = %query, "searching");
        let timeout = self.settings.search_timeout;
        // The source owns the deadline and returns partial results at it.
        let guard = timeout + self.settings.search_grace;
        let result = match tokio::time::timeout(guard, self.source.search(&query, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(DownloadError::SearchTimeout(timeout)),
        };
        match result {
            Ok(candidates) => Ok(candidates),
            Err(err) => {
                let reason = err.to_string();
                Err(self.fail(d, DownloadEvent::SearchFailed { reason }, err).await)
            }
        }
    }

    async fn attempt(&self, d: &mut Download, ctx: &JobContext) -> Result<JobOutcome, Stop> {
        if let Some(outcome) = self.make_startable(d).await? {
            return Ok(outcome);
        }
        self.check_abort(d, ctx, None).await?;
        self.apply(d, DownloadEvent::Start).await?;

        let track = match self.catalog.lookup(&d.track_id).await {
            Ok(Some(track)) => track,
            Ok(None) => {
                let err = DownloadError::UnknownTrack(d.track_id.clone());
                let reason = err.to_string();
                return Err(self.fail(d, DownloadEvent::SearchFailed { reason }, err).await);
            }
            Err(e) => {
                let err = DownloadError::storage(e);
                let reason = err.to_string();
                return Err(self.fail(d, DownloadEvent::SearchFailed { reason }, err).await);
            }
        };

        let candidates = self.search(d, &track).await?;
        self.check_abort(d, ctx, None).await?;
        if ctx.is_paused() {
            self.apply(d, DownloadEvent::Pause).await?;
            tracing::info!(download_id = %d.id, "paused before transfer; deferring");
            return Ok(JobOutcome::Deferred);
        }

        let ranked = rank(&candidates, &track, &self.settings.constraints);
        tracing::debug!(
            download_id = %d.id,
            offered = candidates.len(),
            acceptable = ranked.len(),
            "candidates scored"
        );
        let Some(best) = ranked.into_iter().next().map(|s| s.candidate) else {
            return Err(self
                .fail(d, DownloadEvent::NoCandidate, DownloadError::NoSuitableSource)
                .await);
        };
        tracing::info!(
            download_id = %d.id,
            peer = %best.peer,
            file = %best.filename,
            "candidate selected"
        );
        self.apply(
            d,
            DownloadEvent::CandidateSelected {
                peer: best.peer.clone(),
                filename: best.filename.clone(),
            },
        )
        .await?;

        let handle = match self.transfer.start_transfer(&best).await {
            Ok(handle) => handle,
            Err(err) => {
                let reason = err.to_string();
                return Err(self.fail(d, DownloadEvent::TransferFailed { reason }, err).await);
            }
        };

        self.watch_transfer(d, ctx, &handle).await?;

        match self.post.process(d, &track).await {
            Ok(()) => {
                self.apply(d, DownloadEvent::ProcessingSucceeded).await?;
                tracing::info!(download_id = %d.id, "download completed");
                Ok(JobOutcome::Completed)
            }
            Err(e) => {
                let err = DownloadError::ProcessingFailed(format!("{e:#}"));
                let reason = err.to_string();
                Err(self.fail(d, DownloadEvent::ProcessingFailed { reason }, err).await)
            }
        }
    }

    /// Poll until the transfer succeeds (download moves to `Processing`), fails,
    /// or shows no change for `stall_timeout`. The remote transfer is cancelled
    /// whenever this attempt gives up on it.
    async fn watch_transfer(
        &self,
        d: &mut Download,
        ctx: &JobContext,
        handle: &TransferHandle,
    ) -> Result<(), Stop> {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_seen: Option<(TransferState, u8)> = None;
        let mut last_change = Instant::now();
        loop {
            ticker.tick().await;
            self.check_abort(d, ctx, Some(handle)).await?;

            let report = match self.transfer.poll(handle).await {
                Ok(report) => report,
                Err(err) => {
                    self.cancel_remote(d, handle).await;
                    let reason = err.to_string();
                    return Err(self.fail(d, DownloadEvent::TransferFailed { reason }, err).await);
                }
            };
            let seen = (report.state.clone(), report.progress);
            if last_seen.as_ref() != Some(&seen) {
                last_seen = Some(seen);
                last_change = Instant::now();
            } else if last_change.elapsed() >= self.settings.stall_timeout {
                self.cancel_remote(d, handle).await;
                let what = match report.state {
                    TransferState::Queued => "stayed queued",
                    _ => "made no progress",
                };
                let err = DownloadError::TransferInterrupted(format!(
                    "transfer {what} for {:?}",
                    self.settings.stall_timeout
                ));
                let reason = err.to_string();
                return Err(self.fail(d, DownloadEvent::TransferFailed { reason }, err).await);
            }
            match report.state {
                TransferState::Succeeded => {
                    self.apply(d, DownloadEvent::TransferComplete).await?;
                    return Ok(());
                }
                TransferState::Failed(reason) => {
                    let err = DownloadError::TransferInterrupted(reason);
                    let reason = err.to_string();
                    return Err(self.fail(d, DownloadEvent::TransferFailed { reason }, err).await);
                }
                TransferState::Queued | TransferState::InProgress => {
                    if report.progress != d.progress || report.speed != d.speed {
                        self.apply(
                            d,
                            DownloadEvent::Progress {
                                progress: report.progress,
                                speed: report.speed,
                                eta: report.eta,
                            },
                        )
                        .await?;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl JobHandler for DownloadHandler {
    async fn handle(&self, job: &Job, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let payload: DownloadPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| DownloadError::MalformedPayload(e.to_string()))?;
        let mut download = self.load(&payload).await?;
        tracing::debug!(
            download_id = %download.id,
            track_id = %download.track_id,
            status = %download.status,
            "download attempt starting"
        );
        match self.attempt(&mut download, ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(Stop::Outcome(outcome)) => Ok(outcome),
            Err(Stop::Error(err)) => Err(err.into()),
        }
    }
}
