//! `trackfetch pause [id]` – pause the running scheduler, or one download.

use anyhow::{bail, Result};
use trackfetch_core::config::TrackfetchConfig;
use trackfetch_core::service::ItemAction;
use trackfetch_core::store::LibraryDb;

use super::{forward, offline_service};
use crate::cli::control_socket::ControlRequest;

pub async fn run_pause(db: &LibraryDb, cfg: &TrackfetchConfig, id: Option<String>) -> Result<()> {
    if let Some(reply) = forward(&ControlRequest::Pause(id.clone())).await? {
        println!("{reply}");
        return Ok(());
    }
    let Some(id) = id else {
        bail!("no running trackfetch instance to pause");
    };
    match offline_service(db, cfg).pause_download(&id).await? {
        ItemAction::Applied => println!("Paused download {id}"),
        ItemAction::Signalled => println!("Pause requested for download {id}"),
    }
    Ok(())
}
