//! Bounded exponential backoff for adapter writes.

use std::thread;
use std::time::Duration;

use crate::sync::SyncError;

/// How many times a write is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(25), Duration::from_secs(1))
    }
}

/// A write that did not succeed within the policy.
#[derive(Debug)]
pub struct RetryFailure {
    pub operation: &'static str,
    pub attempts: u32,
    pub error: SyncError,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    #[must_use]
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    /// A single attempt.
    #[must_use]
    pub fn none() -> Self {
        Self::immediate(1)
    }

    /// `attempts` tries with no delay between them.
    #[must_use]
    pub fn immediate(attempts: u32) -> Self {
        Self::new(attempts, Duration::ZERO, Duration::ZERO)
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }

    /// Run `write` until it succeeds, fails permanently, or runs out of
    /// attempts.
    pub fn run<T>(
        &self,
        operation: &'static str,
        mut write: impl FnMut() -> Result<T, SyncError>,
    ) -> Result<T, RetryFailure> {
        let mut attempt = 1;
        loop {
            match write() {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "write failed, retrying"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(error) => {
                    return Err(RetryFailure {
                        operation,
                        attempts: attempt,
                        error,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemId;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy::new(10, Duration::from_millis(25), Duration::from_millis(150));
        assert_eq!(policy.backoff(1), Duration::from_millis(25));
        assert_eq!(policy.backoff(2), Duration::from_millis(50));
        assert_eq!(policy.backoff(3), Duration::from_millis(100));
        assert_eq!(policy.backoff(4), Duration::from_millis(150));
        assert_eq!(policy.backoff(64), Duration::from_millis(150));
    }

    #[test]
    fn transient_failures_are_retried() {
        let mut calls = 0;
        let out = RetryPolicy::immediate(3).run("test", || {
            calls += 1;
            if calls < 3 {
                Err(SyncError::Unavailable("flaky".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(out.unwrap(), 3);
    }

    #[test]
    fn exhaustion_reports_attempts() {
        let failure = RetryPolicy::immediate(2)
            .run("test", || Err::<(), _>(SyncError::Unavailable("down".into())))
            .unwrap_err();
        assert_eq!(failure.attempts, 2);
        assert!(failure.error.is_retryable());
    }

    #[test]
    fn permanent_failures_are_not_retried() {
        let mut calls = 0;
        let failure = RetryPolicy::immediate(5)
            .run("test", || {
                calls += 1;
                Err::<(), _>(SyncError::NotFound(ItemId::new("x")))
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert_eq!(failure.attempts, 1);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::immediate(0).max_attempts(), 1);
    }
}
