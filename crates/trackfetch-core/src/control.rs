//! Job control for pause/cancel: shared abort tokens and the IPC socket path.
//!
//! When the scheduler runs a job it registers an abort token for it. A control
//! client (e.g. `trackfetch pause <id>` via socket) can request an abort for
//! that job; the download handler checks the token between steps and stops.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::scheduler::JobId;

/// Why a running job is being asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Park the download in `Paused`; it can be resumed later.
    Pause,
    /// Fail the download with "cancelled by user".
    Cancel,
}

impl AbortReason {
    fn code(self) -> u8 {
        match self {
            AbortReason::Pause => 1,
            AbortReason::Cancel => 2,
        }
    }
}

/// Abort flag handed to a running job. A cancel request overrides a pause.
#[derive(Debug, Clone, Default)]
pub struct AbortToken(Arc<AtomicU8>);

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, reason: AbortReason) {
        self.0.fetch_max(reason.code(), Ordering::AcqRel);
    }

    pub fn reason(&self) -> Option<AbortReason> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            1 => Some(AbortReason::Pause),
            _ => Some(AbortReason::Cancel),
        }
    }
}

/// Shared registry of job id -> abort token.
#[derive(Debug, Default)]
pub struct JobControl {
    jobs: RwLock<HashMap<JobId, AbortToken>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running job; returns the token to hand to its handler.
    pub fn register(&self, job_id: JobId) -> AbortToken {
        let token = AbortToken::new();
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id, token.clone());
        token
    }

    /// Unregister a job (call when the job finishes, success or failure).
    pub fn unregister(&self, job_id: JobId) {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);
    }

    /// Signal a running job. Returns false when no job with that id is registered.
    pub fn request_abort(&self, job_id: JobId, reason: AbortReason) -> bool {
        match self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
        {
            Some(token) => {
                token.request(reason);
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, job_id: JobId) -> bool {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&job_id)
    }
}

/// Default path for the control socket (same XDG state dir as the DB).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("trackfetch")?.get_state_home();
    Ok(dir.join("control.sock"))
}
