//! `trackfetch retry <id>` – re-queue a failed download.

use anyhow::Result;
use trackfetch_core::config::TrackfetchConfig;
use trackfetch_core::store::LibraryDb;

use super::{forward, offline_service};
use crate::cli::control_socket::ControlRequest;

pub async fn run_retry(db: &LibraryDb, cfg: &TrackfetchConfig, id: &str) -> Result<()> {
    if let Some(reply) = forward(&ControlRequest::Retry(id.to_string())).await? {
        println!("{reply}");
        return Ok(());
    }
    offline_service(db, cfg).retry_download(id).await?;
    println!("Download {id} re-queued. Use `trackfetch run` to fetch it.");
    Ok(())
}
