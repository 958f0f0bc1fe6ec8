//! JSON shapes of the peer API and their mapping to core types.

use serde::{Deserialize, Serialize};

use crate::matching::Candidate;
use crate::transfer::{TransferProgress, TransferState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchRequest<'a> {
    pub id: &'a str,
    pub search_text: &'a str,
    /// Milliseconds.
    pub search_timeout: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchState {
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchResponse {
    pub username: String,
    #[serde(default)]
    pub files: Vec<SearchFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchFile {
    pub filename: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub bit_rate: Option<u32>,
}

/// One file in `POST /transfers/downloads/{username}`.
#[derive(Debug, Serialize)]
pub(crate) struct DownloadRequest<'a> {
    pub filename: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserTransfers {
    #[serde(default)]
    pub directories: Vec<TransferDirectory>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransferDirectory {
    #[serde(default)]
    pub files: Vec<Transfer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Transfer {
    pub id: String,
    pub filename: String,
    pub state: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub bytes_transferred: u64,
    #[serde(default)]
    pub average_speed: f64,
}

impl UserTransfers {
    /// The transfer for `filename`, if the peer API lists one.
    pub fn find(&self, filename: &str) -> Option<&Transfer> {
        self.directories
            .iter()
            .flat_map(|d| d.files.iter())
            .find(|t| t.filename == filename)
    }
}

/// Flatten search responses into candidates, in response order.
pub(crate) fn candidates(responses: Vec<SearchResponse>) -> Vec<Candidate> {
    responses
        .into_iter()
        .flat_map(|r| {
            let peer = r.username;
            r.files.into_iter().map(move |f| Candidate {
                peer: peer.clone(),
                filename: f.filename,
                bitrate: f.bit_rate,
                size: f.size,
            })
        })
        .collect()
}

/// Map a transfer state string such as `"Completed, Succeeded"` or `"Queued, Remotely"`.
pub(crate) fn transfer_state(state: &str) -> TransferState {
    let s = state.to_ascii_lowercase();
    if s.contains("succeeded") {
        TransferState::Succeeded
    } else if s.starts_with("completed") {
        TransferState::Failed(state.to_string())
    } else if s.contains("inprogress") || s.contains("initializing") {
        TransferState::InProgress
    } else {
        TransferState::Queued
    }
}

impl Transfer {
    pub fn progress(&self) -> TransferProgress {
        let speed = (self.average_speed.is_finite() && self.average_speed >= 1.0)
            .then(|| self.average_speed as u64);
        TransferProgress::from_bytes(
            self.bytes_transferred,
            self.size,
            speed,
            transfer_state(&self.state),
        )
    }
}
