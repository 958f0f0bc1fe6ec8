//! Control socket: server (during `trackfetch run`) and client (for `trackfetch pause` etc.).
//!
//! Protocol: one line per command, one reply line per command.
//! Commands: `pause`, `resume`, `pause <id>`, `resume <id>`, `cancel <id>`,
//! `retry <id>`, `requeue`. Replies start with `ok:` or `error:`.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use trackfetch_core::service::{DownloadService, ItemAction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    /// Global when `None`.
    Pause(Option<String>),
    Resume(Option<String>),
    Cancel(String),
    Retry(String),
    /// Pick up Pending downloads added since the run started.
    Requeue,
}

impl ControlRequest {
    pub fn to_line(&self) -> String {
        match self {
            ControlRequest::Pause(None) => "pause".to_string(),
            ControlRequest::Pause(Some(id)) => format!("pause {id}"),
            ControlRequest::Resume(None) => "resume".to_string(),
            ControlRequest::Resume(Some(id)) => format!("resume {id}"),
            ControlRequest::Cancel(id) => format!("cancel {id}"),
            ControlRequest::Retry(id) => format!("retry {id}"),
            ControlRequest::Requeue => "requeue".to_string(),
        }
    }
}

/// Parse one protocol line; `None` for anything malformed.
pub fn parse_line(line: &str) -> Option<ControlRequest> {
    let mut parts = line.split_whitespace();
    let command = parts.next()?;
    let id = parts.next().map(str::to_string);
    if parts.next().is_some() {
        return None;
    }
    match (command, id) {
        ("pause", id) => Some(ControlRequest::Pause(id)),
        ("resume", id) => Some(ControlRequest::Resume(id)),
        ("cancel", Some(id)) => Some(ControlRequest::Cancel(id)),
        ("retry", Some(id)) => Some(ControlRequest::Retry(id)),
        ("requeue", None) => Some(ControlRequest::Requeue),
        _ => None,
    }
}

fn describe(action: ItemAction, what: &str, id: &str) -> String {
    match action {
        ItemAction::Applied => format!("ok: {what} {id}"),
        ItemAction::Signalled => format!("ok: {what} requested for running download {id}"),
    }
}

async fn dispatch(service: &DownloadService, request: ControlRequest) -> String {
    let result = match &request {
        ControlRequest::Pause(None) => {
            service.pause();
            Ok("ok: paused".to_string())
        }
        ControlRequest::Resume(None) => service.resume().await.map(|_| "ok: resumed".to_string()),
        ControlRequest::Pause(Some(id)) => service
            .pause_download(id)
            .await
            .map(|a| describe(a, "paused", id)),
        ControlRequest::Resume(Some(id)) => service
            .resume_download(id)
            .await
            .map(|_| format!("ok: resumed {id}")),
        ControlRequest::Cancel(id) => service
            .cancel(id)
            .await
            .map(|a| describe(a, "cancelled", id)),
        ControlRequest::Retry(id) => service
            .retry_download(id)
            .await
            .map(|_| format!("ok: re-queued {id}")),
        ControlRequest::Requeue => service
            .requeue_persisted()
            .await
            .map(|n| format!("ok: queued {n} download(s)")),
    };
    match result {
        Ok(reply) => reply,
        Err(e) => {
            tracing::debug!(request = %request.to_line(), "control request failed: {:#}", e);
            format!("error: {e:#}")
        }
    }
}

/// Spawns a task that listens on `path` and applies each command line to `service`.
/// Malformed lines get an error reply.
pub fn spawn_control_listener(
    service: Arc<DownloadService>,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)?;
    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let service = Arc::clone(&service);
                    tokio::spawn(async move {
                        let (read, mut write) = stream.into_split();
                        let mut lines = BufReader::new(read).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            let reply = match parse_line(&line) {
                                Some(request) => dispatch(&service, request).await,
                                None => format!("error: unknown command {:?}", line.trim()),
                            };
                            if write.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

/// Sends one command and returns the reply line, or `None` when no
/// `trackfetch run` is listening on `socket_path`.
pub async fn send(socket_path: &Path, request: &ControlRequest) -> Result<Option<String>> {
    if !socket_path.exists() {
        return Ok(None);
    }
    let mut stream = match UnixStream::connect(socket_path).await {
        Ok(s) => s,
        Err(e) => {
            tracing::debug!(path = %socket_path.display(), "control socket connect: {}", e);
            return Ok(None);
        }
    };
    let msg = format!("{}\n", request.to_line());
    stream.write_all(msg.as_bytes()).await?;
    let mut reply = String::new();
    BufReader::new(stream).read_line(&mut reply).await?;
    Ok(Some(reply.trim().to_string()))
}
