//! Candidate source: free-text search over the peer network.

use std::time::Duration;

use async_trait::async_trait;

use crate::matching::Candidate;
use crate::retry::DownloadError;

/// Search service returning unordered, unverified file offers.
///
/// Implementations own the `timeout`: when it passes they stop collecting and
/// return what they have. Callers allow a short grace period on top for that
/// final round trip before failing with [`DownloadError::SearchTimeout`].
/// An empty list is a valid answer.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn search(&self, query: &str, timeout: Duration) -> Result<Vec<Candidate>, DownloadError>;
}
