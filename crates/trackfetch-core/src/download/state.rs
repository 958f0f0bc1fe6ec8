//! Download state machine: (record, event) -> record.
//!
//! Allowed transitions:
//!
//! ```text
//! Pending     --Start-------------------> Searching
//! Searching   --CandidateSelected-------> Downloading
//! Searching   --NoCandidate/SearchFailed-> Failed      (+1 retry)
//! Downloading --Progress----------------> Downloading
//! Downloading --TransferComplete--------> Processing  (progress = 100)
//! Downloading --TransferFailed----------> Failed      (+1 retry)
//! Processing  --ProcessingSucceeded-----> Completed
//! Processing  --ProcessingFailed--------> Failed      (+1 retry)
//! Pending|Searching|Downloading|Processing --Pause--> Paused
//! Paused      --Resume------------------> Pending
//! Failed      --Retry-------------------> Pending
//! (any mutable) --Cancel----------------> Failed      ("cancelled by user", no retry used)
//! ```

use super::record::{Download, DownloadStatus};

/// Error message recorded when no candidate survives filtering.
pub const NO_SOURCE_MESSAGE: &str = "no suitable source found";
/// Error message recorded when the user cancels a download.
pub const CANCELLED_MESSAGE: &str = "cancelled by user";

/// Something that happened to a download.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    /// A worker picked the download up.
    Start,
    /// The search step failed (timeout, peer API unreachable).
    SearchFailed { reason: String },
    /// Scoring accepted a candidate.
    CandidateSelected { peer: String, filename: String },
    /// Scoring rejected every candidate.
    NoCandidate,
    /// Transfer backend progress report.
    Progress {
        progress: u8,
        speed: Option<u64>,
        eta: Option<u64>,
    },
    /// Every byte arrived.
    TransferComplete,
    /// The transfer broke off.
    TransferFailed { reason: String },
    ProcessingSucceeded,
    ProcessingFailed { reason: String },
    Pause,
    Resume,
    Cancel,
    Retry,
}

impl DownloadEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DownloadEvent::Start => "start",
            DownloadEvent::SearchFailed { .. } => "search_failed",
            DownloadEvent::CandidateSelected { .. } => "candidate_selected",
            DownloadEvent::NoCandidate => "no_candidate",
            DownloadEvent::Progress { .. } => "progress",
            DownloadEvent::TransferComplete => "transfer_complete",
            DownloadEvent::TransferFailed { .. } => "transfer_failed",
            DownloadEvent::ProcessingSucceeded => "processing_succeeded",
            DownloadEvent::ProcessingFailed { .. } => "processing_failed",
            DownloadEvent::Pause => "pause",
            DownloadEvent::Resume => "resume",
            DownloadEvent::Cancel => "cancel",
            DownloadEvent::Retry => "retry",
        }
    }
}

/// Rejected transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("download {id} is {status} and can no longer change")]
    Immutable { id: String, status: DownloadStatus },
    #[error("event {event} is not valid for a {from} download")]
    Invalid {
        from: DownloadStatus,
        event: &'static str,
    },
}

/// Apply `event` to `current`, returning the next record. `current` is untouched.
pub fn transition(
    current: &Download,
    event: DownloadEvent,
    now: i64,
) -> Result<Download, TransitionError> {
    use DownloadStatus::*;

    if current.is_immutable() {
        return Err(TransitionError::Immutable {
            id: current.id.clone(),
            status: current.status,
        });
    }

    let event_name = event.name();
    let mut next = current.clone();
    match (current.status, event) {
        (Pending, DownloadEvent::Start) => {
            next.status = Searching;
            next.started_at = Some(now);
            next.error_message = None;
        }
        (Searching, DownloadEvent::CandidateSelected { peer, filename }) => {
            next.status = Downloading;
            next.source_peer = Some(peer);
            next.source_filename = Some(filename);
            next.progress = 0;
        }
        (Searching, DownloadEvent::NoCandidate) => fail(&mut next, NO_SOURCE_MESSAGE.to_string(), true),
        (Searching, DownloadEvent::SearchFailed { reason }) => fail(&mut next, reason, true),
        (
            Downloading,
            DownloadEvent::Progress {
                progress,
                speed,
                eta,
            },
        ) => {
            next.progress = progress.min(100);
            next.speed = speed;
            next.eta = eta;
        }
        (Downloading, DownloadEvent::TransferComplete) => {
            next.status = Processing;
            next.progress = 100;
            next.eta = Some(0);
        }
        (Downloading, DownloadEvent::TransferFailed { reason }) => fail(&mut next, reason, true),
        (Processing, DownloadEvent::ProcessingSucceeded) => {
            next.status = Completed;
            next.completed_at = Some(now);
            next.error_message = None;
            next.speed = None;
        }
        (Processing, DownloadEvent::ProcessingFailed { reason }) => fail(&mut next, reason, true),
        (Pending | Searching | Downloading | Processing, DownloadEvent::Pause) => {
            next.status = Paused;
            next.speed = None;
            next.eta = None;
        }
        (Paused, DownloadEvent::Resume) | (Failed, DownloadEvent::Retry) => reset_to_pending(&mut next),
        (_, DownloadEvent::Cancel) => fail(&mut next, CANCELLED_MESSAGE.to_string(), false),
        (from, _) => {
            return Err(TransitionError::Invalid {
                from,
                event: event_name,
            })
        }
    }
    next.updated_at = now;
    Ok(next)
}

fn fail(next: &mut Download, reason: String, consumes_retry: bool) {
    next.status = DownloadStatus::Failed;
    next.error_message = Some(reason);
    next.speed = None;
    next.eta = None;
    if consumes_retry {
        next.retry_count = next.retry_count.saturating_add(1);
    }
}

fn reset_to_pending(next: &mut Download) {
    next.status = DownloadStatus::Pending;
    next.progress = 0;
    next.speed = None;
    next.eta = None;
    next.source_peer = None;
    next.source_filename = None;
}

impl Download {
    /// In-place variant of [`transition`]; on error the record is unchanged.
    pub fn apply(&mut self, event: DownloadEvent, now: i64) -> Result<(), TransitionError> {
        *self = transition(self, event, now)?;
        Ok(())
    }
}
