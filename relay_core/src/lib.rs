//! RelayKit core - Resilience primitives for integration workloads.
//!
//! This crate provides the building blocks the RelayKit coordinator uses to
//! call unreliable collaborators safely:
//!
//! - **Breaker Module**: Per-dependency circuit breaking with three-state
//!   recovery (closed, open, half-open)
//! - **Retry Module**: Bounded retries with a fixed exponential backoff
//!   schedule, optionally guarded by a breaker
//! - **Metrics Module**: Atomic request/latency/event counters shared across
//!   concurrent tasks
//! - **Event Module**: In-process publish/subscribe bus for integration
//!   events
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use relay_core::{BreakerConfig, BreakerRegistry, IntegrationMetrics, RetryExecutor};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let breakers = Arc::new(BreakerRegistry::new(BreakerConfig::default()));
//!     let executor = RetryExecutor::new(breakers, IntegrationMetrics::new());
//!
//!     let value = executor
//!         .execute(Some("github"), 3, || async { Ok(42) })
//!         .await?;
//!     assert_eq!(value, 42);
//!     Ok(())
//! }
//! ```

pub mod breaker;
pub mod error;
pub mod event;
pub mod metrics;
pub mod retry;

// Re-export commonly used types
pub use breaker::{BreakerConfig, BreakerRegistry, CircuitBreaker, CircuitState};
pub use error::{CoreError, Result};
pub use event::{EventBus, EventHandler, IntegrationEvent};
pub use metrics::{IntegrationMetrics, MetricsSummary};
pub use retry::{RetryExecutor, RetryPolicy};
