//! Bounded retry with a fixed delay between attempts.

use crate::cancellation::CancellationToken;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// How many times a stage may run and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first. Always at least 1.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    #[serde(with = "duration_secs")]
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    /// One retry after five minutes.
    fn default() -> Self {
        Self::from_retries(1, Duration::from_secs(300))
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` below 1 is raised to 1.
    #[must_use]
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    /// Creates a policy from a retry count, so `retries = 1` allows two attempts.
    #[must_use]
    pub fn from_retries(retries: u32, retry_delay: Duration) -> Self {
        Self::new(retries.saturating_add(1), retry_delay)
    }

    /// A single attempt with no delay.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self::new(max_attempts, self.retry_delay)
    }

    /// Sets the delay between attempts.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Decides what to do after attempt number `attempt` (1-based) failed.
    #[must_use]
    pub fn decide(&self, attempt: u32, retryable: bool) -> RetryDecision {
        if !retryable {
            RetryDecision::NotRetryable
        } else if attempt >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(self.retry_delay)
        }
    }
}

/// Decision after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait for the delay and try again.
    Retry(Duration),
    /// Attempts are exhausted.
    GiveUp,
    /// The error cannot be fixed by retrying.
    NotRetryable,
}

/// Result of [`with_retry`] together with the number of attempts made.
#[derive(Debug)]
pub struct Attempted<T, E> {
    /// The final result.
    pub result: Result<T, E>,
    /// Attempts made, at least 1.
    pub attempts: u32,
}

/// Runs `operation` under `policy`.
///
/// `operation` receives the 1-based attempt number. Errors for which
/// `is_retryable` is false end the loop at once. Cancellation is checked while
/// waiting between attempts; a cancelled token ends the loop with the last error.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    key: &str,
    cancel: &CancellationToken,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Attempted<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        let err = match operation(attempt).await {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(err) => err,
        };

        match policy.decide(attempt, is_retryable(&err)) {
            RetryDecision::Retry(delay) => {
                tracing::warn!(
                    stage = key,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_secs = delay.as_secs_f64(),
                    error = %err,
                    "Attempt failed, retrying after delay"
                );
                let interrupted = tokio::select! {
                    () = tokio::time::sleep(delay) => false,
                    () = cancel.cancelled() => true,
                };
                if interrupted || cancel.is_cancelled() {
                    return Attempted {
                        result: Err(err),
                        attempts: attempt,
                    };
                }
                attempt += 1;
            }
            RetryDecision::GiveUp | RetryDecision::NotRetryable => {
                return Attempted {
                    result: Err(err),
                    attempts: attempt,
                };
            }
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_default_policy_allows_one_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.retry_delay, Duration::from_secs(300));
    }

    #[test]
    fn test_max_attempts_floor() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
        assert_eq!(RetryPolicy::no_retry().with_max_attempts(0).max_attempts, 1);
    }

    #[test]
    fn test_decide() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.decide(1, true), RetryDecision::Retry(Duration::from_secs(1)));
        assert_eq!(policy.decide(3, true), RetryDecision::GiveUp);
        assert_eq!(policy.decide(1, false), RetryDecision::NotRetryable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_exactly_max_with_fixed_delay() {
        let policy = RetryPolicy::new(3, Duration::from_secs(300));
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let attempted: Attempted<(), String> = with_retry(
            &policy,
            "flaky",
            &CancellationToken::new(),
            |_| true,
            |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("down".to_string())
                }
            },
        )
        .await;

        assert!(attempted.result.is_err());
        assert_eq!(attempted.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_later_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        let attempted: Attempted<u32, String> = with_retry(
            &policy,
            "flaky",
            &CancellationToken::new(),
            |_| true,
            |attempt| async move {
                if attempt < 3 {
                    Err("down".to_string())
                } else {
                    Ok(attempt)
                }
            },
        )
        .await;

        assert_eq!(attempted.result, Ok(3));
        assert_eq!(attempted.attempts, 3);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let policy = RetryPolicy::new(5, Duration::from_secs(300));
        let attempted: Attempted<(), String> = with_retry(
            &policy,
            "strict",
            &CancellationToken::new(),
            |_| false,
            |_| async { Err("invalid".to_string()) },
        )
        .await;

        assert_eq!(attempted.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_delay() {
        let policy = RetryPolicy::new(3, Duration::from_secs(300));
        let token = Arc::new(CancellationToken::new());
        {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                token.cancel("shutdown");
            });
        }

        let attempted: Attempted<(), String> = with_retry(
            &policy,
            "flaky",
            &token,
            |_| true,
            |_| async { Err("down".to_string()) },
        )
        .await;

        assert_eq!(attempted.attempts, 1);
        assert!(attempted.result.is_err());
    }
}
