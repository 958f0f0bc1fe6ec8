//! Download record type and persisted status.

use serde::{Deserialize, Serialize};

/// Download identifier (UUID v4, stored as text).
pub type DownloadId = String;

/// Lifecycle status of a download, stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Searching,
    Downloading,
    Processing,
    Completed,
    Failed,
    Paused,
}

impl DownloadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Searching => "searching",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Processing => "processing",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Paused => "paused",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => DownloadStatus::Pending,
            "searching" => DownloadStatus::Searching,
            "downloading" => DownloadStatus::Downloading,
            "processing" => DownloadStatus::Processing,
            "completed" => DownloadStatus::Completed,
            "paused" => DownloadStatus::Paused,
            _ => DownloadStatus::Failed,
        }
    }

    /// States a worker is actively driving.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            DownloadStatus::Searching | DownloadStatus::Downloading | DownloadStatus::Processing
        )
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One track's acquisition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Download {
    pub id: DownloadId,
    pub track_id: String,
    pub status: DownloadStatus,
    pub priority: i32,
    /// Percent complete, 0..=100.
    pub progress: u8,
    /// Bytes per second reported by the transfer backend.
    pub speed: Option<u64>,
    /// Seconds remaining reported (or derived) from the transfer backend.
    pub eta: Option<u64>,
    /// Set when a candidate is chosen, never before.
    pub source_peer: Option<String>,
    pub source_filename: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub updated_at: i64,
}

impl Download {
    /// New `Pending` record for `track_id`.
    pub fn new(track_id: impl Into<String>, priority: i32, max_retries: u32, now: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            track_id: track_id.into(),
            status: DownloadStatus::Pending,
            priority,
            progress: 0,
            speed: None,
            eta: None,
            source_peer: None,
            source_filename: None,
            error_message: None,
            retry_count: 0,
            max_retries,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// A Failed record that still accepts `Retry`.
    ///
    /// `retry_count` counts failed attempts, so a record may fail
    /// `max_retries + 1` times; only the failure after the last retry
    /// exhausts it. With `retry_count == max_retries` one retry remains.
    pub fn can_retry(&self) -> bool {
        self.status == DownloadStatus::Failed && !self.is_exhausted()
    }

    /// Failed after the whole budget (first attempt plus `max_retries` retries) was spent.
    pub fn is_exhausted(&self) -> bool {
        self.status == DownloadStatus::Failed && self.retry_count > self.max_retries
    }

    /// Completed and exhausted records reject every event.
    pub fn is_immutable(&self) -> bool {
        self.status == DownloadStatus::Completed || self.is_exhausted()
    }
}
