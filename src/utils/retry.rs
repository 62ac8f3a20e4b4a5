use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Exponential backoff for rate-limited upstream calls.
///
/// Only failures that classify themselves as rate limits are retried; every
/// other error is returned straight away. The async and blocking entry points
/// share `next_delay`, so the schedule is identical and only the way the wait
/// is performed differs.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (at most `max_retries + 1` calls).
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Upper bound of the uniform jitter added to every wait.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(2),
            max_jitter: Duration::from_secs(1),
        }
    }
}

/// An error that knows whether it came from upstream throttling.
pub trait Retryable: Display {
    fn is_rate_limited(&self) -> bool;
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            ..Self::default()
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.max_jitter = Duration::ZERO;
        self
    }

    /// Wait before retry number `attempt` (0-based): `initial * 2^attempt + jitter`.
    fn next_delay(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.saturating_mul(1u32 << attempt.min(16));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::rng().random_range(0..jitter_ms))
    }

    /// Decide whether a failed attempt is retried; returns the wait if so.
    fn should_retry<E: Retryable>(&self, label: &str, attempt: u32, err: &E) -> Option<Duration> {
        if !err.is_rate_limited() || attempt >= self.max_retries {
            return None;
        }
        let delay = self.next_delay(attempt);
        log::warn!(
            "[{}] rate limited (attempt {}), retrying in {:.2}s, {} retries left: {}",
            label,
            attempt + 1,
            delay.as_secs_f64(),
            self.max_retries - attempt - 1,
            err
        );
        Some(delay)
    }

    /// Run `operation`, suspending the current task between attempts.
    pub async fn run_async<F, Fut, T, E>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(val) => return Ok(val),
                Err(e) => match self.should_retry(label, attempt, &e) {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return Err(e),
                },
            }
            attempt += 1;
        }
    }

    /// Run `operation`, parking the calling thread between attempts.
    /// Must not be called from inside an async task.
    pub fn run_blocking<F, T, E>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Retryable,
    {
        let mut attempt = 0;
        loop {
            match operation() {
                Ok(val) => return Ok(val),
                Err(e) => match self.should_retry(label, attempt, &e) {
                    Some(delay) => std::thread::sleep(delay),
                    None => return Err(e),
                },
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn throttled() -> SourceError {
        SourceError::RateLimited { url: "https://example.com/quote".to_string() }
    }

    #[test]
    fn test_rate_limit_classified_by_variant() {
        assert!(throttled().is_rate_limited());
        assert!(SourceError::Throttled { message: "25 requests per day".to_string() }.is_rate_limited());
        assert!(!SourceError::parse("connection refused").is_rate_limited());
        // the status and url text never count, only the variant
        let not_found = SourceError::Status { status: 404, url: "https://example.com/q?apikey=X429Y".to_string() };
        assert!(!not_found.is_rate_limited());
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2)).without_jitter();
        assert_eq!(policy.next_delay(0), Duration::from_secs(2));
        assert_eq!(policy.next_delay(1), Duration::from_secs(4));
        assert_eq!(policy.next_delay(2), Duration::from_secs(8));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        for _ in 0..50 {
            let d = policy.next_delay(0);
            assert!(d >= Duration::from_millis(100) && d < Duration::from_millis(1100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_retries_rate_limit_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Duration::from_secs(2)).without_jitter();
        let started = tokio::time::Instant::now();

        let c = calls.clone();
        let result: Result<u32, SourceError> = policy
            .run_async("test", || {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst);
                    if n < 2 { Err(throttled()) } else { Ok(n) }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 2s + 4s of virtual time
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(2, Duration::from_millis(10)).without_jitter();

        let c = calls.clone();
        let result: Result<(), SourceError> = policy
            .run_async("test", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(throttled())
                }
            })
            .await;

        assert!(matches!(result, Err(SourceError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_async_does_not_retry_status_with_429_in_url() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let c = calls.clone();
        let result: Result<(), SourceError> = policy
            .run_async("test", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(SourceError::Status { status: 404, url: "https://example.com/query?apikey=AB429".to_string() })
                }
            })
            .await;

        assert!(matches!(result, Err(SourceError::Status { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_blocking_matches_async_semantics() {
        let calls = Cell::new(0u32);
        let policy = RetryPolicy::new(3, Duration::from_millis(1)).without_jitter();

        let result: Result<u32, SourceError> = policy.run_blocking("test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 { Err(throttled()) } else { Ok(calls.get()) }
        });
        assert_eq!(result.unwrap(), 3);

        calls.set(0);
        let result: Result<u32, SourceError> = policy.run_blocking("test", || {
            calls.set(calls.get() + 1);
            Err(SourceError::parse("rate limit mentioned in a parse failure"))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
