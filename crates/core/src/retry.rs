//! Retry wrapper with exponential backoff and uniform jitter.
//!
//! `call_with_retry` is the single composition point for resilience: it asks
//! the circuit breaker for permission before every attempt, retries only
//! transient errors, and reports each outcome back to the breaker. An open
//! breaker short-circuits the whole call without sleeping.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::breaker::CircuitBreaker;
use crate::error::{ApiError, ApiResult};

/// Bounds for the retry loop. `max_attempts` counts the first try.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_delay,
            max_delay,
        }
    }

    /// Delay before retry number `attempt` (1-based): uniform random in
    /// `[min_delay, min(min_delay * 2^attempt, max_delay)]`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = 2u64.saturating_pow(attempt.min(16));
        let high = self
            .min_delay
            .saturating_mul(exp.min(u32::MAX as u64) as u32)
            .min(self.max_delay)
            .max(self.min_delay);
        if high <= self.min_delay {
            return self.min_delay;
        }
        let low_ms = self.min_delay.as_millis() as u64;
        let high_ms = high.as_millis() as u64;
        let jittered = rand::thread_rng().gen_range(low_ms..=high_ms);
        Duration::from_millis(jittered)
    }
}

/// Run `op` under the retry policy and circuit breaker.
///
/// Permanent errors are returned on the first occurrence. Transient errors
/// are recorded with the breaker and retried until the attempt budget runs
/// out; the last error is returned. The jitter is sampled before the sleep so
/// no RNG handle lives across an await point.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    breaker: &CircuitBreaker,
    mut op: F,
) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        breaker.try_acquire()?;

        match op().await {
            Ok(value) => {
                breaker.record_success();
                return Ok(value);
            }
            Err(err) if err.is_transient() => {
                breaker.record_failure();
                if attempt >= policy.max_attempts {
                    tracing::warn!(
                        breaker = %breaker.name(),
                        attempts = attempt,
                        error = %err,
                        "retries exhausted"
                    );
                    return Err(err);
                }
                let delay = policy.backoff_delay(attempt);
                tracing::debug!(
                    breaker = %breaker.name(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                // The dependency answered; a half-open probe must not stay
                // half-open or the breaker would reject calls forever.
                breaker.record_permanent();
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(5),
        )
    }

    fn open_ready_breaker() -> CircuitBreaker {
        CircuitBreaker::new("retry-test", 100, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let breaker = open_ready_breaker();
        let result = call_with_retry(&fast_policy(3), &breaker, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ApiError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_retried_until_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let breaker = open_ready_breaker();
        let result: ApiResult<()> = call_with_retry(&fast_policy(3), &breaker, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::server_error(503, "still down"))
            }
        })
        .await;
        assert!(matches!(result, Err(ApiError::ServerError { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let breaker = open_ready_breaker();
        let result: ApiResult<()> = call_with_retry(&fast_policy(5), &breaker, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::not_found("no such repo"))
            }
        })
        .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let breaker = open_ready_breaker();
        let result = call_with_retry(&fast_policy(3), &breaker, || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ApiError::timeout("slow"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(breaker.state(), crate::breaker::BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let breaker = CircuitBreaker::new("short", 1, Duration::from_secs(60));
        breaker.record_failure();
        assert_eq!(breaker.state(), crate::breaker::BreakerState::Open);

        let result: ApiResult<()> = call_with_retry(&fast_policy(3), &breaker, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
        assert!(matches!(result, Err(ApiError::ServiceUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_permanent_error_on_probe_does_not_wedge_breaker() {
        let breaker = CircuitBreaker::new("probe", 1, Duration::from_millis(10));
        breaker.record_failure();
        assert_eq!(breaker.state(), crate::breaker::BreakerState::Open);
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The half-open probe gets through and answers with a permanent
        // error, which still resolves the probe.
        let result: ApiResult<()> = call_with_retry(&fast_policy(3), &breaker, || async {
            Err(ApiError::not_found("no such repo"))
        })
        .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert_eq!(breaker.state(), crate::breaker::BreakerState::Closed);

        // A healthy call afterwards succeeds instead of failing fast.
        let result = call_with_retry(&fast_policy(3), &breaker, || async {
            Ok::<_, ApiError>("ok")
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_repeated_failures_open_shared_breaker() {
        let breaker = CircuitBreaker::new("shared", 5, Duration::from_secs(60));
        for _ in 0..2 {
            let _: ApiResult<()> = call_with_retry(&fast_policy(3), &breaker, || async {
                Err(ApiError::network("connection refused"))
            })
            .await;
        }
        // 3 + 2 failures recorded; the fifth opened the circuit, so the
        // second call's third attempt never ran.
        assert_eq!(breaker.state(), crate::breaker::BreakerState::Open);
    }

    #[test]
    fn test_backoff_delay_within_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(80));
        for attempt in 1..=6 {
            let d = policy.backoff_delay(attempt);
            assert!(d >= Duration::from_millis(10), "attempt {attempt}: {d:?}");
            assert!(d <= Duration::from_millis(80), "attempt {attempt}: {d:?}");
        }
    }
}
