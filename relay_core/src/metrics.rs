//! Integration metrics for requests, latency, and event throughput.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Process-lifetime metrics accumulator.
///
/// Cloning is cheap and every clone shares the same counters, so the
/// retry executor, event bus, and coordinator can all update one instance
/// from concurrently running tasks.
#[derive(Clone, Debug)]
pub struct IntegrationMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    /// Total request latency (nanoseconds)
    total_latency_ns: AtomicU64,
    events_processed: AtomicU64,
}

impl IntegrationMetrics {
    /// Creates a new metrics accumulator with all counters at zero.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                total_requests: AtomicU64::new(0),
                successful_requests: AtomicU64::new(0),
                failed_requests: AtomicU64::new(0),
                total_latency_ns: AtomicU64::new(0),
                events_processed: AtomicU64::new(0),
            }),
        }
    }

    /// Records one completed request and its observed latency.
    pub fn record_request(&self, success: bool, latency: Duration) {
        self.inner.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.inner.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.inner
            .total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Records one event dispatched by the event bus.
    pub fn record_event(&self) {
        self.inner.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Total requests recorded.
    pub fn total_requests(&self) -> u64 {
        self.inner.total_requests.load(Ordering::Relaxed)
    }

    /// Successful requests recorded.
    pub fn successful_requests(&self) -> u64 {
        self.inner.successful_requests.load(Ordering::Relaxed)
    }

    /// Failed requests recorded.
    pub fn failed_requests(&self) -> u64 {
        self.inner.failed_requests.load(Ordering::Relaxed)
    }

    /// Events dispatched by the bus.
    pub fn events_processed(&self) -> u64 {
        self.inner.events_processed.load(Ordering::Relaxed)
    }

    /// Fraction of requests that succeeded (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        self.successful_requests() as f64 / total as f64
    }

    /// Mean latency across all recorded requests.
    pub fn average_latency(&self) -> Duration {
        let total = self.total_requests();
        if total == 0 {
            return Duration::ZERO;
        }
        let ns = self.inner.total_latency_ns.load(Ordering::Relaxed);
        Duration::from_nanos(ns / total)
    }

    /// Gets all metrics as a summary.
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_requests: self.total_requests(),
            successful_requests: self.successful_requests(),
            failed_requests: self.failed_requests(),
            events_processed: self.events_processed(),
            success_rate: self.success_rate(),
            average_latency: self.average_latency(),
        }
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        self.inner.total_requests.store(0, Ordering::Relaxed);
        self.inner.successful_requests.store(0, Ordering::Relaxed);
        self.inner.failed_requests.store(0, Ordering::Relaxed);
        self.inner.total_latency_ns.store(0, Ordering::Relaxed);
        self.inner.events_processed.store(0, Ordering::Relaxed);
    }
}

impl Default for IntegrationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of integration metrics.
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    /// Total requests observed
    pub total_requests: u64,
    /// Requests that succeeded
    pub successful_requests: u64,
    /// Requests that failed after retries
    pub failed_requests: u64,
    /// Events dispatched by the bus
    pub events_processed: u64,
    /// Fraction of requests that succeeded (0.0 to 1.0)
    pub success_rate: f64,
    /// Mean request latency
    pub average_latency: Duration,
}
