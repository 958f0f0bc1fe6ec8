//! Transfer backend: starts, monitors, and cancels remote file transfers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::matching::Candidate;
use crate::retry::DownloadError;

/// Opaque reference to a started transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferHandle {
    pub peer: String,
    pub filename: String,
    /// Backend-specific transfer id, once known.
    pub id: Option<String>,
}

/// Coarse transfer state as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    /// Waiting for a slot on the remote peer.
    Queued,
    InProgress,
    /// Every byte arrived.
    Succeeded,
    /// Unrecoverable failure (rejected, errored, timed out, cancelled remotely).
    Failed(String),
}

/// One poll result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    /// Percent complete, 0..=100.
    pub progress: u8,
    /// Bytes per second.
    pub speed: Option<u64>,
    /// Seconds remaining.
    pub eta: Option<u64>,
    pub state: TransferState,
}

impl TransferProgress {
    /// Build a report from byte counts; ETA is derived from the speed when the backend has none.
    pub fn from_bytes(
        bytes_done: u64,
        total_bytes: u64,
        speed: Option<u64>,
        state: TransferState,
    ) -> Self {
        let progress = if total_bytes == 0 {
            if state == TransferState::Succeeded {
                100
            } else {
                0
            }
        } else {
            ((bytes_done.min(total_bytes) as f64 / total_bytes as f64) * 100.0).floor() as u8
        };
        Self {
            progress,
            speed,
            eta: eta_secs(total_bytes.saturating_sub(bytes_done), speed),
            state,
        }
    }
}

/// Estimated seconds remaining (None if speed is 0 or unknown).
pub fn eta_secs(bytes_remaining: u64, speed: Option<u64>) -> Option<u64> {
    if bytes_remaining == 0 {
        return Some(0);
    }
    match speed {
        Some(s) if s > 0 => Some(bytes_remaining.div_ceil(s)),
        _ => None,
    }
}

#[async_trait]
pub trait TransferBackend: Send + Sync {
    async fn start_transfer(&self, candidate: &Candidate) -> Result<TransferHandle, DownloadError>;
    async fn poll(&self, handle: &TransferHandle) -> Result<TransferProgress, DownloadError>;
    async fn cancel(&self, handle: &TransferHandle) -> Result<(), DownloadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_from_bytes() {
        let p = TransferProgress::from_bytes(512, 1024, Some(128), TransferState::InProgress);
        assert_eq!(p.progress, 50);
        assert_eq!(p.eta, Some(4));
        let done = TransferProgress::from_bytes(1024, 1024, None, TransferState::Succeeded);
        assert_eq!(done.progress, 100);
        assert_eq!(done.eta, Some(0));
    }

    #[test]
    fn eta_unknown_without_speed() {
        assert_eq!(eta_secs(100, None), None);
        assert_eq!(eta_secs(100, Some(0)), None);
        assert_eq!(eta_secs(100, Some(30)), Some(4));
    }
}
