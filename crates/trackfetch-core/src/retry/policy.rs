use std::time::Duration;

use crate::config::RetryConfig;

/// High-level classification of an error for retry purposes.
///
/// Callers map search, transfer, and storage failures into these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Search did not complete in time.
    Timeout,
    /// Peer API or remote peer unreachable.
    PeerUnavailable,
    /// Transfer started but broke off.
    Interrupted,
    /// No candidate survived filtering.
    NoCandidate,
    /// Post-processing reported failure.
    Processing,
    /// User cancellation; never retried and does not use a retry slot.
    Cancelled,
    /// Not retried (storage failures, exhausted records).
    Permanent,
    /// Configuration error (unknown job kind, malformed payload); not retried, logged loudly.
    Fatal,
}

impl ErrorKind {
    /// True if this failure consumes a retry slot and may be re-attempted.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::PeerUnavailable
                | ErrorKind::Interrupted
                | ErrorKind::NoCandidate
                | ErrorKind::Processing
        )
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff policy with caps.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each later retry.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: Duration::try_from_secs_f64(cfg.base_delay_secs)
                .unwrap_or(Duration::from_secs(1)),
            max_delay: Duration::from_secs(cfg.max_delay_secs),
        }
    }

    /// Same delays, different retry budget (jobs carry their own `max_retries`).
    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = 1u32 << retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(exp).min(self.max_delay)
    }

    /// Decide what to do after a failure.
    ///
    /// `retries_used` is the number of retries already spent before this
    /// failure. Returns `RetryDecision::NoRetry` when we should stop.
    pub fn decide(&self, retries_used: u32, kind: ErrorKind) -> RetryDecision {
        if !kind.is_retryable() || retries_used >= self.max_retries {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.backoff(retries_used + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delay(d: RetryDecision) -> Duration {
        match d {
            RetryDecision::RetryAfter(d) => d,
            RetryDecision::NoRetry => panic!("expected retry"),
        }
    }

    #[test]
    fn no_retry_for_cancel_or_fatal() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(0, ErrorKind::Cancelled), RetryDecision::NoRetry);
        assert_eq!(p.decide(0, ErrorKind::Fatal), RetryDecision::NoRetry);
        assert_eq!(p.decide(0, ErrorKind::Permanent), RetryDecision::NoRetry);
    }

    #[test]
    fn backoff_doubles_from_base() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(1), Duration::from_secs(1));
        assert_eq!(p.backoff(2), Duration::from_secs(2));
        assert_eq!(p.backoff(3), Duration::from_secs(4));
        assert_eq!(delay(p.decide(0, ErrorKind::Timeout)), Duration::from_secs(1));
        assert_eq!(delay(p.decide(2, ErrorKind::Interrupted)), Duration::from_secs(4));
    }

    #[test]
    fn backoff_strictly_increases_until_cap() {
        let mut p = RetryPolicy::default();
        p.max_retries = 20;
        let delays: Vec<Duration> = (1..=8).map(|k| p.backoff(k)).collect();
        for pair in delays.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        assert_eq!(p.backoff(30), p.max_delay);
    }

    #[test]
    fn respects_max_retries() {
        let p = RetryPolicy::default().with_max_retries(3);
        assert!(matches!(p.decide(0, ErrorKind::NoCandidate), RetryDecision::RetryAfter(_)));
        assert!(matches!(p.decide(2, ErrorKind::NoCandidate), RetryDecision::RetryAfter(_)));
        assert_eq!(p.decide(3, ErrorKind::NoCandidate), RetryDecision::NoRetry);
    }
}
