//! `trackfetch status` – show status of all downloads.

use anyhow::Result;
use trackfetch_core::store::LibraryDb;

pub async fn run_status(db: &LibraryDb) -> Result<()> {
    let downloads = db.list_downloads().await?;
    if downloads.is_empty() {
        println!("No downloads in database.");
        return Ok(());
    }
    println!(
        "{:<36} {:<11} {:>4} {:>5} {:>7}  {}",
        "ID", "STATUS", "PRIO", "PROG", "RETRIES", "TRACK"
    );
    for d in downloads {
        let track = match db.get_track(&d.track_id).await? {
            Some(t) => format!("{} - {}", t.artist, t.title),
            None => d.track_id.clone(),
        };
        let detail = match (&d.error_message, &d.source_peer) {
            (Some(err), _) => format!("  [{err}]"),
            (None, Some(peer)) if d.status.is_active() => format!("  <- {peer}"),
            _ => String::new(),
        };
        println!(
            "{:<36} {:<11} {:>4} {:>4}% {:>3}/{:<3}  {}{}",
            d.id,
            d.status.as_str(),
            d.priority,
            d.progress,
            d.retry_count,
            d.max_retries,
            track,
            detail
        );
    }
    Ok(())
}
