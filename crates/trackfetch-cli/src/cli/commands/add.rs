//! `trackfetch add <artist> <title>` – register a track and queue its download.

use anyhow::Result;
use trackfetch_core::config::TrackfetchConfig;
use trackfetch_core::matching::WantedTrack;
use trackfetch_core::store::LibraryDb;

use super::{forward, offline_service};
use crate::cli::control_socket::ControlRequest;

pub async fn run_add(
    db: &LibraryDb,
    cfg: &TrackfetchConfig,
    artist: &str,
    title: &str,
    album: Option<String>,
    priority: i32,
) -> Result<()> {
    let track = WantedTrack {
        artist: artist.to_string(),
        title: title.to_string(),
        album,
    };
    let track_id = db.add_track(&track).await?;
    let download_id = offline_service(db, cfg)
        .enqueue_download(&track_id, priority)
        .await?;
    println!("Added download {download_id} for {artist} - {title} (priority {priority})");

    if forward(&ControlRequest::Requeue).await?.is_some() {
        println!("Handed to the running instance.");
    }
    Ok(())
}
