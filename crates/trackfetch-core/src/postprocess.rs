//! Post-processing handoff (tagging, artwork, moving into the library).
//!
//! The orchestrator only needs the success/failure signal.

use async_trait::async_trait;

use crate::download::Download;
use crate::matching::WantedTrack;

#[async_trait]
pub trait PostProcessor: Send + Sync {
    async fn process(&self, download: &Download, track: &WantedTrack) -> anyhow::Result<()>;
}

/// Accepts every finished transfer as-is; files stay where the transfer backend put them.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeepAsIs;

#[async_trait]
impl PostProcessor for KeepAsIs {
    async fn process(&self, download: &Download, track: &WantedTrack) -> anyhow::Result<()> {
        tracing::info!(
            download_id = %download.id,
            file = download.source_filename.as_deref().unwrap_or("-"),
            "kept {} - {} without post-processing",
            track.artist,
            track.title
        );
        Ok(())
    }
}
