//! In-process event bus for integration events.
//!
//! Carries [`IntegrationEvent`] records between agents and the coordinator.
//! Dispatch is a single path: `publish` invokes subscribers inline, while
//! `enqueue` feeds an unbounded FIFO drained by `run` (or `drain` in tests)
//! through the same dispatch routine. Delivery is at-least-once to local
//! subscribers; there is no external broker and no persistence.

use crate::error::{CoreError, Result};
use crate::metrics::IntegrationMetrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Event record exchanged between integration components.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntegrationEvent {
    /// Unique event identifier
    pub event_id: Uuid,
    /// Dispatch tag handlers subscribe to (e.g. "task.completed")
    pub event_type: String,
    /// Platform or component that produced the event
    pub source_platform: String,
    /// Platform the event is aimed at, if any
    pub target_platform: Option<String>,
    /// Opaque structured payload
    pub payload: Value,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Correlation key linking related events (e.g. a workflow ID)
    pub correlation_id: Option<String>,
    /// Delivery attempts already made
    pub retry_count: u32,
    /// Delivery attempts allowed
    pub max_retries: u32,
}

impl IntegrationEvent {
    /// Creates a new event stamped with a fresh ID and the current time.
    pub fn new(
        event_type: impl Into<String>,
        source_platform: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            source_platform: source_platform.into(),
            target_platform: None,
            payload,
            timestamp: Utc::now(),
            correlation_id: None,
            retry_count: 0,
            max_retries: 3,
        }
    }

    /// Sets the target platform.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_platform = Some(target.into());
        self
    }

    /// Sets the correlation ID.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Sets the maximum delivery attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Handler invoked for every event of a subscribed type.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Processes one event. Errors are logged and isolated; they never
    /// prevent other handlers from running.
    async fn handle(&self, event: &IntegrationEvent) -> anyhow::Result<()>;
}

/// Publish/subscribe queue for integration events.
///
/// Handlers are invoked in registration order. One handler's failure is
/// logged and does not stop the others or un-mark the event as processed.
///
/// # Example
///
/// ```ignore
/// let bus = EventBus::new(metrics);
/// bus.subscribe("task.completed", Arc::new(MyHandler)).await;
/// bus.publish(IntegrationEvent::new("task.completed", "coordinator", payload)).await;
/// ```
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
    tx: UnboundedSender<IntegrationEvent>,
    rx: Mutex<UnboundedReceiver<IntegrationEvent>>,
    metrics: IntegrationMetrics,
}

impl EventBus {
    /// Creates a bus reporting throughput into the shared metrics.
    pub fn new(metrics: IntegrationMetrics) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            subscribers: RwLock::new(HashMap::new()),
            tx,
            rx: Mutex::new(rx),
            metrics,
        }
    }

    /// Registers a handler for an event type.
    ///
    /// Handlers for the same type run in registration order.
    pub async fn subscribe(&self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.entry(event_type.into()).or_default().push(handler);
    }

    /// Dispatches an event to its subscribers inline.
    pub async fn publish(&self, event: IntegrationEvent) {
        self.dispatch(&event).await;
    }

    /// Queues an event for the dispatch loop without dispatching inline.
    pub fn enqueue(&self, event: IntegrationEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| CoreError::QueueClosed)
    }

    /// Dispatch loop: dequeues and dispatches queued events until the
    /// queue closes. Intended to be spawned by callers that want the
    /// decoupled-queue view instead of inline dispatch.
    pub async fn run(&self) {
        loop {
            let event = {
                let mut rx = self.rx.lock().await;
                rx.recv().await
            };
            match event {
                Some(event) => self.dispatch(&event).await,
                None => break,
            }
        }
    }

    /// Dispatches every currently queued event and returns how many ran.
    pub async fn drain(&self) -> usize {
        let mut processed = 0;
        loop {
            let event = {
                let mut rx = self.rx.lock().await;
                rx.try_recv().ok()
            };
            match event {
                Some(event) => {
                    self.dispatch(&event).await;
                    processed += 1;
                }
                None => break,
            }
        }
        processed
    }

    /// Returns the number of handlers registered for an event type.
    pub async fn subscriber_count(&self, event_type: &str) -> usize {
        self.subscribers
            .read()
            .await
            .get(event_type)
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }

    async fn dispatch(&self, event: &IntegrationEvent) {
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let subscribers = self.subscribers.read().await;
            subscribers
                .get(&event.event_type)
                .cloned()
                .unwrap_or_default()
        };

        for handler in handlers {
            if let Err(err) = handler.handle(event).await {
                tracing::warn!(
                    event_type = %event.event_type,
                    event_id = %event.event_id,
                    error = %err,
                    "event handler failed"
                );
            }
        }
        self.metrics.record_event();
    }
}
