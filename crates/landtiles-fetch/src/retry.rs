//! Bounded retry with exponential backoff.

use crate::{CancelToken, FetchError};
use landtiles_core::RetrySettings;
use std::time::Duration;
use tracing::warn;

/// How often and how patiently to retry transient failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Cap on the delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Policy without delays, for tests and local mirrors.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay after the failed attempt `attempt` (1-based): doubles each time.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }
}

/// Run `op` until it succeeds, fails permanently or attempts run out.
///
/// Only errors for which [`FetchError::is_transient`] holds are retried.
/// Cancellation is checked before every attempt and during backoff.
pub fn with_retry<T>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    what: &str,
    mut op: impl FnMut() -> Result<T, FetchError>,
) -> Result<T, FetchError> {
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff_for(attempt);
                warn!(
                    what,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                if !cancel.sleep(delay) {
                    return Err(FetchError::Cancelled);
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> FetchError {
        FetchError::Status {
            url: "u".to_string(),
            status: 503,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1_000),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(800));
        assert_eq!(policy.backoff_for(5), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_for(60), Duration::from_millis(1_000));
    }

    #[test]
    fn test_retries_transient_until_success() {
        let mut calls = 0;
        let result = with_retry(&RetryPolicy::immediate(3), &CancelToken::new(), "t", || {
            calls += 1;
            if calls < 3 {
                Err(transient())
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: Result<(), _> = with_retry(&RetryPolicy::immediate(3), &CancelToken::new(), "t", || {
            calls += 1;
            Err(transient())
        });
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_permanent_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = with_retry(&RetryPolicy::immediate(5), &CancelToken::new(), "t", || {
            calls += 1;
            Err(FetchError::Status {
                url: "u".to_string(),
                status: 404,
            })
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_cancelled_before_first_attempt() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result: Result<(), _> = with_retry(&RetryPolicy::immediate(3), &cancel, "t", || {
            panic!("must not be called")
        });
        assert!(matches!(result, Err(FetchError::Cancelled)));
    }
}
