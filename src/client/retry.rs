//! Retry policies.
//!
//! A policy is the ordered list of waits between attempts: with `N` intervals a call is
//! attempted at most `N + 1` times.
//!
//! ```
//! use tablestore_http::client::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::exponential(3, Duration::from_millis(100));
//! let waits: Vec<_> = policy.intervals().collect();
//! assert_eq!(waits, [
//!     Duration::from_millis(100),
//!     Duration::from_millis(200),
//!     Duration::from_millis(400),
//! ]);
//! ```

use crate::error::TableError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest exponent applied by [`RetryPolicy::exponential`].
const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Most retries a configured policy may ask for.
pub const MAX_RETRIES: usize = 100;

/// Ordered waits between attempts. The default performs no retry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Wait before each retry, in milliseconds
    pub intervals_ms: Vec<u64>,
}

impl RetryPolicy {
    /// No retry.
    pub fn none() -> Self {
        Self::default()
    }

    /// `retries` retries, each after `interval`.
    pub fn fixed(retries: usize, interval: Duration) -> Self {
        Self::from_intervals(vec![interval; retries])
    }

    /// `retries` retries after `base`, `2 * base`, `4 * base` and so on.
    pub fn exponential(retries: usize, base: Duration) -> Self {
        Self::from_intervals(
            (0..retries)
                .map(|attempt| exponential_backoff(attempt as u32, base))
                .collect(),
        )
    }

    /// Explicit list of waits.
    pub fn from_intervals(intervals: Vec<Duration>) -> Self {
        Self {
            intervals_ms: intervals.iter().map(|d| d.as_millis() as u64).collect(),
        }
    }

    /// Waits in order.
    pub fn intervals(&self) -> impl Iterator<Item = Duration> + '_ {
        self.intervals_ms.iter().map(|ms| Duration::from_millis(*ms))
    }

    /// Most retries this policy performs.
    pub fn max_retries(&self) -> usize {
        self.intervals_ms.len()
    }

    /// Wait before retry number `retry` (zero-based), or `None` once exhausted.
    pub fn interval(&self, retry: usize) -> Option<Duration> {
        self.intervals_ms.get(retry).map(|ms| Duration::from_millis(*ms))
    }

    /// Whether `error` is worth another attempt.
    ///
    /// Transport failures are retried. Service errors are retried when their code is one of
    /// `InternalError`, `OperationTimedOut`, `ServerBusy` or `TableBeingDeleted`. Validation,
    /// framing and decode errors never are.
    pub fn should_retry(&self, error: &TableError) -> bool {
        error.is_retryable()
    }
}

/// `base * 2^attempt`, with the exponent capped.
pub fn exponential_backoff(attempt: u32, base: Duration) -> Duration {
    base.saturating_mul(2_u32.pow(attempt.min(MAX_BACKOFF_EXPONENT)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;

    fn service(code: &str) -> TableError {
        ServiceError::new(503, Some(code.to_string()), "m").into()
    }

    #[test]
    fn test_default_does_not_retry() {
        assert_eq!(RetryPolicy::default().max_retries(), 0);
        assert_eq!(RetryPolicy::none().interval(0), None);
    }

    #[test]
    fn test_fixed() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(50));
        assert_eq!(policy.max_retries(), 3);
        assert!(policy.intervals().all(|d| d == Duration::from_millis(50)));
        assert_eq!(policy.interval(3), None);
    }

    #[test]
    fn test_backoff_is_capped() {
        let base = Duration::from_millis(1);
        assert_eq!(exponential_backoff(2, base), Duration::from_millis(4));
        assert_eq!(exponential_backoff(30, base), Duration::from_millis(1024));
    }

    #[test]
    fn test_classification() {
        let policy = RetryPolicy::fixed(1, Duration::ZERO);
        for code in ["InternalError", "OperationTimedOut", "ServerBusy", "TableBeingDeleted"] {
            assert!(policy.should_retry(&service(code)), "{code}");
        }
        assert!(!policy.should_retry(&service("ResourceNotFound")));
        assert!(policy.should_retry(&TableError::Transport("reset".into())));
        assert!(!policy.should_retry(&TableError::Framing("x".into())));
        assert!(!policy.should_retry(&TableError::Decode("x".into())));
    }

    #[test]
    fn test_serde_round_trip() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"intervals_ms":[10,20]}"#).unwrap();
        assert_eq!(policy, RetryPolicy::from_intervals(vec![
            Duration::from_millis(10),
            Duration::from_millis(20),
        ]));
    }
}
