//! Retry and backoff policy.
//!
//! This module encapsulates error classification (search timeouts, peer
//! outages, interrupted transfers, cancellations) and exponential backoff
//! decisions so that the scheduler and the download handler share a
//! consistent policy.

mod classify;
mod error;
mod policy;

pub use classify::classify;
pub use error::DownloadError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
