//! Download attempt error type for retry classification.

use std::time::Duration;

use crate::download::TransitionError;

/// Error returned by one download attempt (search, transfer, processing, or storage).
/// Used so we can classify and decide retries before it is flattened into a job error.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The candidate source did not answer within the search timeout.
    #[error("search timed out after {}s", .0.as_secs())]
    SearchTimeout(Duration),
    /// The peer API or the remote peer could not be reached.
    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),
    /// The transfer started but did not complete.
    #[error("transfer interrupted: {0}")]
    TransferInterrupted(String),
    /// Every candidate was filtered out (or none were returned).
    #[error("no suitable source found")]
    NoSuitableSource,
    /// Post-processing reported failure.
    #[error("processing failed: {0}")]
    ProcessingFailed(String),
    /// Stopped by an explicit user cancel.
    #[error("cancelled by user")]
    Cancelled,
    /// The job payload could not be decoded or points at a missing record.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    /// The track catalog has no entry for the requested track.
    #[error("unknown track {0}")]
    UnknownTrack(String),
    /// The download record has used up its retry budget.
    #[error("download {0} has exhausted its retries")]
    Exhausted(String),
    /// The download record rejected the event (invalid or immutable).
    #[error(transparent)]
    Transition(#[from] TransitionError),
    /// Persistence failed (load/save of the download record).
    #[error("storage: {0:#}")]
    Storage(anyhow::Error),
}

impl DownloadError {
    pub fn storage(err: anyhow::Error) -> Self {
        DownloadError::Storage(err)
    }
}
