//! Bounded retry with exponential backoff.
//!
//! Wait before retry `n` (1-based) is `base * 2^(n-1)`, capped at `max`.
//! With the defaults (4 s base, 10 s cap, 3 attempts) the sequence is
//! 4 s → 8 s. Only [`ProviderError::is_transient`] failures are retried.

use crate::config::ConverterConfig;
use crate::error::ProviderError;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always ≥ 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ConverterConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.retry_backoff_ms),
            max_delay: Duration::from_millis(config.retry_max_backoff_ms),
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Returns the last error when every attempt failed.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let backoff = self.delay_for(attempt);
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {}ms",
                        label,
                        attempt,
                        attempts,
                        e,
                        backoff.as_millis()
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> ProviderError {
        ProviderError::Http {
            provider: "test".into(),
            status: 503,
            body: String::new(),
        }
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn delay_grows_geometrically_within_cap() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(1), Duration::from_secs(4));
        assert_eq!(p.delay_for(2), Duration::from_secs(8));
        assert_eq!(p.delay_for(3), Duration::from_secs(10));
        assert_eq!(p.delay_for(40), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = &AtomicU32::new(0);
        let out = fast(3)
            .run("test", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok("done")
                }
            })
            .await;
        assert_eq!(out.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let out: Result<(), _> = fast(3)
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            })
            .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let out: Result<(), _> = fast(3)
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::UnsupportedPayload {
                    provider: "test".into(),
                    mime_type: "application/pdf".into(),
                })
            })
            .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
