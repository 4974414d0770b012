//! Exponential backoff retry policy (SPEC_FULL §4.4).
//!
//! Grounded on `siumai-core/src/retry/policy.rs`, with the default initial delay
//! raised from the teacher's 1000ms to the 2s the spec calls for.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::LlmError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub use_jitter: bool,
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            use_jitter: true,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn should_retry(&self, error: &LlmError) -> bool {
        error.is_retryable()
    }

    /// Delay before attempt `attempt` (0-indexed: the sleep that precedes the *next* try).
    /// Honors a server-provided `Retry-After` hint when the error carries one.
    pub fn calculate_delay(&self, attempt: u32, error: &LlmError) -> Duration {
        if let Some(secs) = error.retry_after_secs() {
            return Duration::from_secs(secs).min(self.max_delay);
        }
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let base = base.min(self.max_delay.as_secs_f64());
        let delay = if self.use_jitter {
            let jitter_range = base * self.jitter_factor;
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (base + jitter).max(0.0)
        } else {
            base
        };
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Callback fired before each retry sleep, e.g. for logging.
pub type OnRetry<'a> = Option<&'a (dyn Fn(u32, Duration, &LlmError) + Send + Sync)>;

pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Runs `operation`, retrying per policy. Sleeps are cancel-aware: a cancelled
    /// `cancel` token aborts the wait and the overall operation returns `Cancelled`.
    pub async fn execute<F, Fut, T>(
        &self,
        cancel: &crate::cancel::CancelHandle,
        on_retry: OnRetry<'_>,
        mut operation: F,
    ) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let is_last = attempt + 1 >= self.policy.max_attempts;
                    if is_last || !self.policy.should_retry(&error) {
                        return Err(error);
                    }
                    let delay = self.policy.calculate_delay(attempt, &error);
                    if let Some(cb) = on_retry {
                        cb(attempt, delay, &error);
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_then_succeeds() {
        let executor = RetryExecutor::new(RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..Default::default()
        });
        let attempts = Arc::new(AtomicU32::new(0));
        let cancel = crate::cancel::CancelHandle::new();
        let result = executor
            .execute(&cancel, None, || {
                let attempts = attempts.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(LlmError::ApiError {
                            status: Some(503),
                            message: "unavailable".into(),
                            retryable: true,
                            details: None,
                            retry_after_secs: None,
                        })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_and_returns_last_error() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..Default::default()
        });
        let cancel = crate::cancel::CancelHandle::new();
        let result: Result<(), LlmError> = executor
            .execute(&cancel, None, || async {
                Err(LlmError::ApiError {
                    status: Some(500),
                    message: "boom".into(),
                    retryable: true,
                    details: None,
                    retry_after_secs: None,
                })
            })
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn delay_never_exceeds_cap() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(1),
            ..Default::default()
        };
        let error = LlmError::ApiError {
            status: Some(500),
            message: "x".into(),
            retryable: true,
            details: None,
            retry_after_secs: None,
        };
        for attempt in 0..10 {
            assert!(policy.calculate_delay(attempt, &error) <= Duration::from_secs(1));
        }
    }

    #[test]
    fn honors_retry_after_hint() {
        let policy = RetryPolicy::default();
        let error = LlmError::ApiError {
            status: Some(429),
            message: "rate limited".into(),
            retryable: true,
            details: None,
            retry_after_secs: Some(5),
        };
        assert_eq!(policy.calculate_delay(0, &error), Duration::from_secs(5));
    }
}
