//! Bounded retry of transient accessibility failures.
//!
//! Accessibility trees are allowed to be briefly unavailable right after a
//! process launches. Operations that report a transient error are retried at
//! a fixed interval until a total timeout, then abandoned; a bounded window
//! prevents unbounded resource retention for processes that never become
//! accessible. Runs only on coordinator threads, never the reactor thread.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::sys::accessibility::AxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub total_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            total_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    #[error("gave up after {0:?}")]
    TimedOut(Duration),
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Permanent(#[from] AxError),
}

/// Invokes `op` until it succeeds, fails permanently, is cancelled, or the
/// policy's total timeout elapses.
///
/// Retries are spaced by `poll_interval`; the loop suspends between attempts
/// rather than blocking, and observes `cancel` while waiting so an
/// application that terminates or becomes ineligible mid-retry stops
/// silently.
pub async fn retry_until_timeout<T>(
    mut op: impl FnMut() -> Result<T, AxError>,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<T, RetryError> {
    let deadline = Instant::now() + policy.total_timeout;
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                attempt += 1;
                if Instant::now() + policy.poll_interval > deadline {
                    trace!(attempt, ?err, "abandoning after timeout");
                    return Err(RetryError::TimedOut(policy.total_timeout));
                }
                trace!(attempt, ?err, "transient failure; will retry");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(policy.poll_interval) => {}
                }
            }
            Err(err) => return Err(RetryError::Permanent(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            total_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let attempts = Cell::new(0);
        let result = retry_until_timeout(
            || {
                attempts.set(attempts.get() + 1);
                if attempts.get() < 3 { Err(AxError::NotReady) } else { Ok(attempts.get()) }
            },
            policy(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn always_transient_is_abandoned_after_timeout() {
        let attempts = Cell::new(0u32);
        let result: Result<(), _> = retry_until_timeout(
            || {
                attempts.set(attempts.get() + 1);
                Err(AxError::NotReady)
            },
            policy(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result, Err(RetryError::TimedOut(Duration::from_secs(2))));
        // Attempts run at t = 0ms, 100ms, ..., 2000ms inclusive; the one at
        // the deadline is the last.
        assert_eq!(attempts.get(), 21);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_aborts_immediately() {
        let attempts = Cell::new(0u32);
        let result: Result<(), _> = retry_until_timeout(
            || {
                attempts.set(attempts.get() + 1);
                Err(AxError::ProcessGone)
            },
            policy(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result, Err(RetryError::Permanent(AxError::ProcessGone)));
        assert_eq!(attempts.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_between_attempts() {
        let cancel = CancellationToken::new();
        let attempts = Cell::new(0u32);
        let fut = retry_until_timeout(
            || {
                attempts.set(attempts.get() + 1);
                Err::<(), _>(AxError::NotReady)
            },
            policy(),
            &cancel,
        );
        tokio::pin!(fut);

        tokio::select! {
            biased;
            _ = &mut fut => unreachable!("retry finished before cancellation"),
            _ = tokio::time::sleep(Duration::from_millis(250)) => cancel.cancel(),
        }
        assert_eq!(fut.await, Err(RetryError::Cancelled));
        let made = attempts.get();
        assert!(made >= 2, "expected a few attempts before cancelling, got {made}");
        assert!(made <= 4, "no attempts may run after cancellation, got {made}");
    }
}
