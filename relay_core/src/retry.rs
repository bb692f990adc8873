//! Retry execution with bounded exponential backoff.
//!
//! Wraps an arbitrary async operation with a fixed backoff schedule and an
//! optional circuit breaker. The executor owns no rollback: the wrapped
//! operation's side effects remain the caller's responsibility.

use crate::breaker::{BreakerRegistry, CircuitBreaker};
use crate::error::{CoreError, Result};
use crate::metrics::IntegrationMetrics;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Backoff schedule for retry attempts.
///
/// The delay for attempt `n` is `backoff[min(n, backoff.len() - 1)]`; the
/// final entry repeats once the schedule is exhausted.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Delay schedule indexed by zero-based attempt number
    pub backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: [1, 2, 4, 8, 16]
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with an explicit delay schedule.
    pub fn new(backoff: Vec<Duration>) -> Self {
        Self { backoff }
    }

    /// Returns the delay to sleep after the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.backoff.is_empty() {
            return Duration::ZERO;
        }
        let idx = (attempt as usize).min(self.backoff.len() - 1);
        self.backoff[idx]
    }
}

/// Executes operations with bounded retries and circuit breaking.
///
/// Every attempt's outcome feeds the breaker for the operation's dependency
/// key (when given), and the overall outcome feeds the shared metrics.
///
/// # Example
///
/// ```ignore
/// let executor = RetryExecutor::new(breakers, metrics);
/// let output = executor
///     .execute(Some("github"), 3, || async { fetch_status().await })
///     .await?;
/// ```
pub struct RetryExecutor {
    breakers: Arc<BreakerRegistry>,
    metrics: IntegrationMetrics,
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Creates an executor over the shared breaker registry and metrics.
    pub fn new(breakers: Arc<BreakerRegistry>, metrics: IntegrationMetrics) -> Self {
        Self {
            breakers,
            metrics,
            policy: RetryPolicy::default(),
        }
    }

    /// Replaces the backoff policy (for builder-style configuration).
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the shared breaker registry.
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Returns the shared metrics accumulator.
    pub fn metrics(&self) -> &IntegrationMetrics {
        &self.metrics
    }

    /// Runs `operation` with up to `max_retries + 1` attempts.
    ///
    /// When `breaker_key` is given and its breaker is not admitting calls,
    /// fails immediately with [`CoreError::CircuitOpen`] without attempting
    /// the operation or recording a request. Otherwise each failed attempt
    /// records a breaker failure and sleeps the scheduled backoff before the
    /// next try; success records a breaker success. The request metric is
    /// recorded once, with the latency of the whole call.
    pub async fn execute<F, Fut, T>(
        &self,
        breaker_key: Option<&str>,
        max_retries: u32,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let breaker: Option<Arc<CircuitBreaker>> =
            breaker_key.map(|key| self.breakers.breaker(key));

        if let (Some(breaker), Some(key)) = (&breaker, breaker_key) {
            if !breaker.can_execute() {
                return Err(CoreError::CircuitOpen(key.to_string()));
            }
        }

        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if let Some(breaker) = &breaker {
                        breaker.record_success();
                    }
                    self.metrics.record_request(true, started.elapsed());
                    return Ok(value);
                }
                Err(err) => {
                    if let Some(breaker) = &breaker {
                        breaker.record_failure();
                    }
                    if attempt < max_retries {
                        let delay = self.policy.delay_for(attempt);
                        tracing::warn!(
                            attempt = attempt + 1,
                            ?delay,
                            error = %err,
                            "operation failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    } else {
                        self.metrics.record_request(false, started.elapsed());
                        return Err(CoreError::RetriesExhausted {
                            attempts: attempt + 1,
                            source: err,
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor() -> RetryExecutor {
        let breakers = Arc::new(BreakerRegistry::new(BreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_probes: 1,
        }));
        RetryExecutor::new(breakers, IntegrationMetrics::new())
            .with_policy(RetryPolicy::new(vec![Duration::from_millis(1)]))
    }

    #[test]
    fn test_delay_schedule_clamps_to_last_entry() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for(100), Duration::from_secs(16));
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let executor = executor();
        let calls = AtomicU32::new(0);

        let result = executor
            .execute(None, 3, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, anyhow::Error>(42) }
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(executor.metrics().successful_requests(), 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let executor = executor();
        let calls = AtomicU32::new(0);

        let result = executor
            .execute(None, 3, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(anyhow!("transient"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let executor = executor();
        let calls = AtomicU32::new(0);

        let result: Result<()> = executor
            .execute(None, 2, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(anyhow!("always fails")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(CoreError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected RetriesExhausted, got {:?}", other.map(|_| ())),
        }
        assert_eq!(executor.metrics().failed_requests(), 1);
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits() {
        let executor = executor();

        // Trip the breaker: threshold of 2 across one exhausted call
        let _ = executor
            .execute(Some("flaky"), 1, || async {
                Err::<(), _>(anyhow!("down"))
            })
            .await;

        let calls = AtomicU32::new(0);
        let result: Result<()> = executor
            .execute(Some("flaky"), 3, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(CoreError::CircuitOpen(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        // The rejected call records no request metric
        assert_eq!(executor.metrics().total_requests(), 1);
    }

    #[tokio::test]
    async fn test_success_feeds_breaker() {
        let executor = executor();

        executor
            .execute(Some("steady"), 0, || async { Ok::<_, anyhow::Error>(()) })
            .await
            .unwrap();

        let breaker = executor.breakers().breaker("steady");
        assert_eq!(breaker.state(), crate::breaker::CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }
}
