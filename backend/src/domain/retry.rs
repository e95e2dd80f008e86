//! Bounded retry policy shared by partition creation and job execution.
//!
//! Contention-style failures are retried a fixed number of times with a short
//! delay between attempts; everything else surfaces immediately. The policy is
//! a value object so every call site retries the same way instead of
//! hand-rolling its own loop.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

/// Bounded retry policy: a maximum attempt count and a fixed delay applied
/// between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Build a policy; `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Maximum number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay applied after the given failed attempt (1-based).
    pub fn delay_for(&self, _attempt: u32) -> Duration {
        self.base_delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

/// Async sleep abstraction so retry delays are controllable in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspend the current task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Tokio-based sleeper used in production wiring.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that returns immediately; used by tests exercising retry loops.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSleeper;

#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

/// Run `op` under `policy`, retrying only failures `is_transient` accepts.
///
/// The final error is returned unchanged once attempts are exhausted or a
/// non-transient failure occurs.
pub async fn run_with_retry<T, E, Op, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    is_transient: impl Fn(&E) -> bool,
    mut op: Op,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts() && is_transient(&err) => {
                sleeper.sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use std::sync::atomic::{AtomicU32, Ordering};

    use rstest::rstest;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct FakeError {
        transient: bool,
    }

    async fn run(policy: RetryPolicy, failures: u32, transient: bool) -> (Result<u32, FakeError>, u32) {
        let calls = AtomicU32::new(0);
        let result = run_with_retry(&policy, &NoopSleeper, |err: &FakeError| err.transient, || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt <= failures {
                    Err(FakeError { transient })
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[rstest]
    #[tokio::test]
    async fn succeeds_without_retry() {
        let (result, calls) = run(RetryPolicy::default(), 0, true).await;
        assert_eq!(result, Ok(1));
        assert_eq!(calls, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let (result, calls) = run(RetryPolicy::default(), 2, true).await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls, 3);
    }

    #[rstest]
    #[tokio::test]
    async fn exhausts_bounded_attempts() {
        let (result, calls) = run(RetryPolicy::default(), 10, true).await;
        assert_eq!(result, Err(FakeError { transient: true }));
        assert_eq!(calls, 3);
    }

    #[rstest]
    #[tokio::test]
    async fn non_transient_failures_surface_immediately() {
        let (result, calls) = run(RetryPolicy::default(), 10, false).await;
        assert_eq!(result, Err(FakeError { transient: false }));
        assert_eq!(calls, 1);
    }

    #[rstest]
    fn max_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }
}
