//! Download records and their lifecycle.
//!
//! A [`Download`] tracks one track's acquisition. Every change goes through
//! [`transition`], a pure function of (record, event, time), so the lifecycle
//! can be tested without a live transfer backend. The [`DownloadHandler`]
//! drives those transitions for scheduled jobs.

mod handler;
mod record;
mod state;

pub use handler::{DownloadHandler, DownloadPayload, HandlerSettings};
pub use record::{Download, DownloadId, DownloadStatus};
pub use state::{transition, DownloadEvent, TransitionError, CANCELLED_MESSAGE, NO_SOURCE_MESSAGE};
