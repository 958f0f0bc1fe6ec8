//! Persistent download/track database (SQLite via sqlx).
//!
//! [`DownloadStore`] is the repository contract the orchestrator depends on;
//! [`LibraryDb`] implements it (and [`crate::catalog::TrackCatalog`]) on a
//! single SQLite file under the XDG state directory.

mod db;
mod downloads;
mod tracks;

use anyhow::Result;
use async_trait::async_trait;

use crate::download::{Download, DownloadStatus};

pub use db::LibraryDb;

/// Transactional key-value access to download records.
#[async_trait]
pub trait DownloadStore: Send + Sync {
    /// Insert or replace the record with `download.id`.
    async fn save(&self, download: &Download) -> Result<()>;
    async fn load(&self, id: &str) -> Result<Option<Download>>;
    /// Records in `status`, highest priority first, then oldest first.
    async fn list_by_status(&self, status: DownloadStatus) -> Result<Vec<Download>>;
}
