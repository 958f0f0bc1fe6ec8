//! `trackfetch run` – process queued downloads until none are left.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use trackfetch_core::config::TrackfetchConfig;
use trackfetch_core::download::{DownloadHandler, DownloadStatus, HandlerSettings};
use trackfetch_core::peer_api::PeerApiClient;
use trackfetch_core::postprocess::KeepAsIs;
use trackfetch_core::scheduler::{JobKind, Scheduler};
use trackfetch_core::service::DownloadService;
use trackfetch_core::store::{DownloadStore, LibraryDb};

use crate::cli::control_socket;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run_scheduler(db: &LibraryDb, cfg: &TrackfetchConfig, jobs: Option<usize>) -> Result<()> {
    let recovered = db.recover_active_downloads().await?;
    if recovered > 0 {
        tracing::info!("recovered {} download(s) from previous run", recovered);
    }

    let client = Arc::new(PeerApiClient::new(&cfg.peer)?);
    let handler = DownloadHandler::new(
        Arc::new(db.clone()),
        Arc::new(db.clone()),
        client.clone(),
        client,
        Arc::new(KeepAsIs),
        HandlerSettings::from_config(cfg),
    );
    let scheduler = Scheduler::from_config(cfg);
    scheduler.register_handler(JobKind::DOWNLOAD, Arc::new(handler));
    let service = Arc::new(DownloadService::new(
        scheduler.clone(),
        Arc::new(db.clone()),
        cfg.retry_or_default().max_retries,
    ));
    if let Some(n) = jobs {
        service.set_max_concurrent(n)?;
    }

    let queued = service.requeue_persisted().await?;
    if queued == 0 {
        println!("No pending downloads.");
        return Ok(());
    }

    let socket_path = trackfetch_core::control::default_control_socket_path().ok();
    let listener = socket_path.as_ref().and_then(|path| {
        match control_socket::spawn_control_listener(Arc::clone(&service), path) {
            Ok(handle) => {
                tracing::debug!(path = %path.display(), "control socket listening");
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "control socket unavailable: {:#}", e);
                None
            }
        }
    });

    let status_source = scheduler.clone();
    let progress_handle = tokio::spawn(async move {
        let mut last = None;
        loop {
            tokio::time::sleep(PROGRESS_INTERVAL).await;
            let s = status_source.status();
            let line = format!(
                "  active {}/{}  queued {}  backing off {}{}",
                s.active,
                s.max_concurrent,
                s.queued,
                s.backing_off,
                if s.paused { "  (paused)" } else { "" }
            );
            if last.as_ref() != Some(&line) {
                println!("{line}");
                last = Some(line);
            }
        }
    });

    scheduler.start(jobs.unwrap_or(cfg.max_concurrent_downloads));
    scheduler.wait_idle().await;
    scheduler.stop().await;
    progress_handle.abort();

    if let Some(handle) = listener {
        handle.abort();
    }
    if let Some(path) = socket_path {
        let _ = std::fs::remove_file(path);
    }

    let completed = db.list_by_status(DownloadStatus::Completed).await?.len();
    let failed = db.list_by_status(DownloadStatus::Failed).await?.len();
    tracing::info!(queued, completed, failed, "run finished");
    println!("Run finished: {completed} completed, {failed} failed in library.");
    Ok(())
}
