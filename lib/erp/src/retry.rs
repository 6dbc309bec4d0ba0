use routewise_core::{RecommendConfig, Result};
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Bounded retry with linear backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    pub fn from_config(config: &RecommendConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_backoff())
    }

    /// Single attempt, no sleeping
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RecommendConfig::default())
    }
}

/// Run `op`, retrying errors whose recovery policy is `Retry`.
///
/// Other errors, and the last retryable one, are returned unchanged.
pub fn with_retry<T, F>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Err(e) if e.is_retryable() && attempt <= policy.retries => {
                let delay = policy.delay(attempt);
                warn!(
                    operation = what,
                    retry = attempt,
                    max_retries = policy.retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after failure"
                );
                thread::sleep(delay);
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use routewise_core::Error;

    fn fast(retries: u32) -> RetryPolicy {
        RetryPolicy::new(retries, Duration::from_millis(1))
    }

    #[test]
    fn test_retries_until_success() {
        let mut calls = 0;
        let result = with_retry(fast(3), "test", || {
            calls += 1;
            if calls < 3 {
                Err(Error::DatabaseUnavailable("down".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_gives_up_after_retries() {
        let mut calls = 0;
        let result: Result<()> = with_retry(fast(3), "test", || {
            calls += 1;
            Err(Error::DatabaseUnavailable("down".into()))
        });
        assert!(matches!(result, Err(Error::DatabaseUnavailable(_))));
        // First try plus three retries
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_no_retries_is_single_attempt() {
        let mut calls = 0;
        let result: Result<()> = with_retry(RetryPolicy::none(), "test", || {
            calls += 1;
            Err(Error::DatabaseUnavailable("down".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_non_retryable_fails_fast() {
        let mut calls = 0;
        let result: Result<()> = with_retry(fast(3), "test", || {
            calls += 1;
            Err(Error::Query("no such table".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retries, 3);
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(6));
    }
}
