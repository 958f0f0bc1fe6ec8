//! Track catalog: resolves track ids to searchable metadata.

use async_trait::async_trait;

use crate::matching::WantedTrack;

#[async_trait]
pub trait TrackCatalog: Send + Sync {
    /// `Ok(None)` when the id is unknown.
    async fn lookup(&self, track_id: &str) -> anyhow::Result<Option<WantedTrack>>;
}
