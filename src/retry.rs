//! Bounded retry combinator for judge calls.
//!
//! Every retrying operation in the crate goes through [`retry_with`]: a
//! fixed attempt budget, an optional fixed delay between attempts, and the
//! last typed error surfaced on exhaustion. Retry loops therefore always
//! terminate and never swallow failure details.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

/// Retry policy: a fixed number of attempts with a fixed delay between them.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Must be at least 1.
    pub attempts: u32,
    /// Delay between attempts. Zero means retry immediately.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Run `op` up to `policy.attempts` times, sleeping `policy.delay` between
/// attempts. `op` receives the zero-based attempt index. Returns the first
/// success, or the last error once the budget is exhausted.
pub async fn retry_with<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;
    for attempt in 0..policy.attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    label,
                    attempt + 1,
                    policy.attempts,
                    e
                );
                last_error = Some(e);
                if attempt + 1 < policy.attempts && !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| Error::Internal(format!("{}: retry loop made no attempts", label))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_first_success_returns_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3);
        let result: Result<u32> = retry_with(&policy, "op", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let policy = RetryPolicy::new(3);
        let result: Result<&str> = retry_with(&policy, "op", |attempt| async move {
            if attempt < 2 {
                Err(Error::transport("flaky"))
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let policy = RetryPolicy::new(2);
        let result: Result<()> = retry_with(&policy, "op", |attempt| async move {
            Err(Error::validation(format!("bad output {}", attempt)))
        })
        .await;
        match result {
            Err(Error::Validation(msg)) => assert_eq!(msg, "bad output 1"),
            other => panic!("expected validation error, got {:?}", other.err()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_applies_between_attempts() {
        let policy = RetryPolicy::new(3).with_delay(Duration::from_secs(1));
        let start = tokio::time::Instant::now();
        let _: Result<()> =
            retry_with(&policy, "op", |_| async { Err(Error::transport("down")) }).await;
        // Two inter-attempt delays for three attempts.
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }
}
