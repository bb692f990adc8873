//! Per-dependency circuit breaking with three-state recovery.
//!
//! A breaker guards one unreliable collaborator. After enough consecutive
//! failures it opens and rejects calls outright; once a cooldown elapses it
//! admits a bounded number of probe calls (half-open) and closes again only
//! after all probes succeed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Circuit breaker states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally; failures are counted.
    Closed,
    /// Calls are rejected until the recovery timeout elapses.
    Open,
    /// A bounded number of probe calls is admitted to test recovery.
    HalfOpen,
}

/// Configuration for a circuit breaker.
#[derive(Clone, Debug)]
pub struct BreakerConfig {
    /// Consecutive failures in Closed before the breaker opens
    pub failure_threshold: u32,
    /// Cooldown before an Open breaker admits probe calls
    pub recovery_timeout: Duration,
    /// Consecutive probe successes required to close from HalfOpen
    pub half_open_max_probes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_probes: 2,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
}

/// Failure gate for a single named dependency.
///
/// State transitions are pure and non-blocking; the breaker performs no I/O.
/// A breaker is shared across every in-flight task targeting its dependency,
/// so the mutable state sits behind a mutex.
///
/// # Example
///
/// ```ignore
/// let breaker = CircuitBreaker::new(BreakerConfig::default());
/// if breaker.can_execute() {
///     match call_dependency().await {
///         Ok(_) => breaker.record_success(),
///         Err(_) => breaker.record_failure(),
///     }
/// }
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a new breaker in the Closed state.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Returns whether a call may proceed right now.
    ///
    /// In Open, the first check after `recovery_timeout` has elapsed since
    /// the last failure transitions the breaker to HalfOpen and resets the
    /// probe counter as a side effect. In HalfOpen, returns true only while
    /// fewer than `half_open_max_probes` probes have succeeded, which bounds
    /// the number of concurrent probes.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => inner.success_count < self.config.half_open_max_probes,
        }
    }

    /// Records a successful call.
    ///
    /// In HalfOpen, reaching `half_open_max_probes` consecutive successes
    /// closes the breaker and resets both counters. In Closed, any success
    /// resets the consecutive failure count, so intermittent failures never
    /// trip the breaker.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.half_open_max_probes {
                    tracing::debug!("circuit breaker recovered, closing");
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                }
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed call.
    ///
    /// In Closed, reaching `failure_threshold` opens the breaker and stamps
    /// the failure time. In HalfOpen, a single failure reopens immediately.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        failures = inner.failure_count,
                        "circuit breaker tripped, opening"
                    );
                    inner.state = CircuitState::Open;
                    inner.last_failure = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.success_count = 0;
                inner.last_failure = Some(Instant::now());
            }
            CircuitState::Open => {
                inner.last_failure = Some(Instant::now());
            }
        }
    }

    /// Returns the current state without side effects.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Returns the current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().unwrap().failure_count
    }
}

/// Registry of circuit breakers keyed by dependency name.
///
/// Breakers are created lazily on first use and live for the process
/// lifetime, all sharing the registry's configuration.
#[derive(Debug)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Creates an empty registry with the given per-breaker configuration.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the breaker for `key`, creating it on first use.
    pub fn breaker(&self, key: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config.clone())))
            .clone()
    }

    /// Returns the state of the breaker for `key`, if one exists.
    pub fn state(&self, key: &str) -> Option<CircuitState> {
        self.breakers.lock().unwrap().get(key).map(|b| b.state())
    }

    /// Returns the keys with a registered breaker.
    pub fn keys(&self) -> Vec<String> {
        self.breakers.lock().unwrap().keys().cloned().collect()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, recovery: Duration, probes: u32) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: recovery,
            half_open_max_probes: probes,
        }
    }

    #[test]
    fn test_opens_exactly_at_threshold() {
        let breaker = CircuitBreaker::new(config(3, Duration::from_secs(60), 1));

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn test_success_resets_failure_count_in_closed() {
        let breaker = CircuitBreaker::new(config(3, Duration::from_secs(60), 1));

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);

        // Two more failures should not trip a threshold of three
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_open_rejects_before_recovery_timeout() {
        let breaker = CircuitBreaker::new(config(1, Duration::from_secs(60), 1));

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_open_transitions_to_half_open_after_timeout() {
        let breaker = CircuitBreaker::new(config(1, Duration::from_millis(10), 1));

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_closes_after_probe_successes() {
        let breaker = CircuitBreaker::new(config(1, Duration::ZERO, 2));

        breaker.record_failure();
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_reopens_on_single_failure() {
        let breaker = CircuitBreaker::new(config(1, Duration::ZERO, 3));

        breaker.record_failure();
        assert!(breaker.can_execute());
        breaker.record_success();

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_half_open_bounds_concurrent_probes() {
        let breaker = CircuitBreaker::new(config(1, Duration::ZERO, 2));

        breaker.record_failure();
        assert!(breaker.can_execute());

        breaker.record_success();
        assert!(breaker.can_execute());
        breaker.record_success();

        // Closed again after two probe successes
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_registry_shares_breaker_per_key() {
        let registry = BreakerRegistry::new(config(1, Duration::from_secs(60), 1));

        let a = registry.breaker("github");
        let b = registry.breaker("github");
        a.record_failure();

        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(registry.state("github"), Some(CircuitState::Open));
        assert_eq!(registry.state("pusher"), None);
        assert_eq!(registry.keys(), vec!["github".to_string()]);
    }
}
