//! `trackfetch resume [id]` – resume the running scheduler, or one paused download.

use anyhow::{bail, Result};
use trackfetch_core::config::TrackfetchConfig;
use trackfetch_core::store::LibraryDb;

use super::{forward, offline_service};
use crate::cli::control_socket::ControlRequest;

pub async fn run_resume(db: &LibraryDb, cfg: &TrackfetchConfig, id: Option<String>) -> Result<()> {
    if let Some(reply) = forward(&ControlRequest::Resume(id.clone())).await? {
        println!("{reply}");
        return Ok(());
    }
    let Some(id) = id else {
        bail!("no running trackfetch instance to resume");
    };
    offline_service(db, cfg).resume_download(&id).await?;
    println!("Download {id} is pending again. Use `trackfetch run` to fetch it.");
    Ok(())
}
