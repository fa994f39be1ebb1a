//! Capped exponential backoff retry.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    /// Doubling backoff (`backoff_factor = 2.0`). Use `with_backoff_factor`
    /// to configure a different multiplier.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            base_delay,
            max_delay,
            backoff_factor: 2.0,
        }
    }

    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    /// Delay before the `attempt`-th retry (1-based), growing by
    /// `backoff_factor` each time and capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.powi(attempt.min(62) as i32);
        let millis = (self.base_delay.as_millis() as f64 * factor).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}

/// Runs `op` until it succeeds, `classify` says the error isn't worth
/// retrying, or `max_attempts` is exhausted — whichever comes first.
pub async fn retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    classify: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= policy.max_attempts || !classify(&err) {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after transient error");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_doubles_and_then_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(10), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(40));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(100));
    }

    #[test]
    fn with_backoff_factor_overrides_the_default_doubling() {
        let policy = RetryPolicy::new(10, Duration::from_millis(10), Duration::from_millis(1000))
            .with_backoff_factor(3.0);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(30));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(90));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(5));
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry(&policy, |_| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("transient")
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_retrying_when_classifier_rejects_error() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(5));
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry(&policy, |_| false, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("fatal") }
        })
        .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5));
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry(&policy, |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("always fails") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
