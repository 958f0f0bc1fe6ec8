//! `trackfetch cancel <id>` – cancel a download.

use anyhow::Result;
use trackfetch_core::config::TrackfetchConfig;
use trackfetch_core::service::ItemAction;
use trackfetch_core::store::LibraryDb;

use super::{forward, offline_service};
use crate::cli::control_socket::ControlRequest;

pub async fn run_cancel(db: &LibraryDb, cfg: &TrackfetchConfig, id: &str) -> Result<()> {
    if let Some(reply) = forward(&ControlRequest::Cancel(id.to_string())).await? {
        println!("{reply}");
        return Ok(());
    }
    match offline_service(db, cfg).cancel(id).await? {
        ItemAction::Applied => println!("Cancelled download {id}"),
        ItemAction::Signalled => println!("Cancel requested for download {id}"),
    }
    Ok(())
}
