//! Exponential-backoff retry policy for 429 responses (§4.3).

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::error::{ApiError, RetryableOutcome};

/// Maximum retries before a rate-limited request is surfaced as
/// [`ApiError::RateLimited`].
pub const MAX_RETRIES: u32 = 5;

const BASE_DELAY: Duration = Duration::from_secs(1);
const MULTIPLIER: f64 = 2.0;
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Computes the backoff delay for retry attempt `n` (0-indexed), honoring a
/// server-supplied `Retry-After` when present, then applying a ±20% jitter.
///
/// When `retry_after` is present it replaces the *whole* computed base —
/// it does not get multiplied again by `mult^n` — so a server that keeps
/// returning the same `Retry-After` value produces a constant delay across
/// retries, not a growing one.
pub fn compute_delay(n: u32, retry_after: Option<Duration>, rng: &mut impl Rng) -> Duration {
    let base = match retry_after {
        Some(header) => header.min(MAX_DELAY),
        None => {
            let exp = BASE_DELAY.as_secs_f64() * MULTIPLIER.powi(n as i32);
            Duration::from_secs_f64(exp.min(MAX_DELAY.as_secs_f64()))
        }
    };
    let jitter = rng.gen_range(0.8..=1.2);
    Duration::from_secs_f64((base.as_secs_f64() * jitter).max(0.0))
}

/// Drives `attempt` until it succeeds, hits a terminal error, or exhausts
/// [`MAX_RETRIES`] retries on repeated rate limiting.
pub async fn with_retry<T, F, Fut>(mut attempt: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RetryableOutcome<T>>,
{
    let mut rng = rand::thread_rng();
    let mut retries = 0u32;
    loop {
        match attempt().await {
            RetryableOutcome::Success(value) => return Ok(value),
            RetryableOutcome::Terminal(err) => return Err(err),
            RetryableOutcome::RateLimited { retry_after } => {
                if retries >= MAX_RETRIES {
                    return Err(ApiError::RateLimited { retries });
                }
                let delay = compute_delay(retries, retry_after, &mut rng);
                tokio::time::sleep(delay).await;
                retries += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn retry_after_header_dominates_and_jitter_stays_within_20_percent() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let d = compute_delay(3, Some(Duration::from_secs(2)), &mut rng);
            assert!(d >= Duration::from_millis(1600), "{d:?}");
            assert!(d <= Duration::from_millis(2400), "{d:?}");
        }
    }

    #[test]
    fn no_header_grows_exponentially_and_caps_at_60s() {
        let mut rng = rand::thread_rng();
        let d0 = compute_delay(0, None, &mut rng);
        assert!(d0 >= Duration::from_millis(800) && d0 <= Duration::from_millis(1200));

        let d_large = compute_delay(10, None, &mut rng);
        assert!(d_large <= Duration::from_secs(72)); // 60s * 1.2 jitter ceiling
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_without_any_retry() {
        let result: Result<u32, ApiError> =
            with_retry(|| async { RetryableOutcome::Success(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_error_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, ApiError> = with_retry(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { RetryableOutcome::Terminal(ApiError::NotFound) }
        })
        .await;
        assert!(matches!(result, Err(ApiError::NotFound)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_5_retries() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, ApiError> = with_retry(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async {
                RetryableOutcome::RateLimited {
                    retry_after: Some(Duration::from_millis(1)),
                }
            }
        })
        .await;
        match result {
            Err(ApiError::RateLimited { retries }) => assert_eq!(retries, MAX_RETRIES),
            other => panic!("expected RateLimited, got {other:?}"),
        }
        // initial attempt + MAX_RETRIES retries
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_RETRIES + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_rate_limiting() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, ApiError> = with_retry(|| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    RetryableOutcome::RateLimited {
                        retry_after: Some(Duration::from_millis(1)),
                    }
                } else {
                    RetryableOutcome::Success(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }
}
