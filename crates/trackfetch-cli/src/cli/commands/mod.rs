//! CLI command handlers, one file per command.
//!
//! Commands that change a download first try the control socket of a running
//! `trackfetch run`; with no run active they apply the change to the database.

mod add;
mod cancel;
mod pause;
mod resume;
mod retry;
mod run;
mod status;

pub use add::run_add;
pub use cancel::run_cancel;
pub use pause::run_pause;
pub use resume::run_resume;
pub use retry::run_retry;
pub use run::run_scheduler;
pub use status::run_status;

use anyhow::{bail, Result};
use std::sync::Arc;
use trackfetch_core::config::TrackfetchConfig;
use trackfetch_core::control::default_control_socket_path;
use trackfetch_core::scheduler::Scheduler;
use trackfetch_core::service::DownloadService;
use trackfetch_core::store::LibraryDb;

use crate::cli::control_socket::{self, ControlRequest};

/// Forward `request` to a running instance. `Ok(None)` when none is listening.
async fn forward(request: &ControlRequest) -> Result<Option<String>> {
    let path = match default_control_socket_path() {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!("no control socket path: {}", e);
            return Ok(None);
        }
    };
    let reply = control_socket::send(&path, request).await?;
    match reply {
        Some(line) if line.starts_with("error:") => bail!("{}", line.trim_start_matches("error:").trim()),
        other => Ok(other),
    }
}

/// Service over the database with a scheduler that is never started: record
/// changes persist, and Pending downloads are picked up by the next `trackfetch run`.
fn offline_service(db: &LibraryDb, cfg: &TrackfetchConfig) -> DownloadService {
    DownloadService::new(
        Scheduler::from_config(cfg),
        Arc::new(db.clone()),
        cfg.retry_or_default().max_retries,
    )
}
