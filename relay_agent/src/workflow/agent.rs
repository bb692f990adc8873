//! Agent handler trait and registry.
//!
//! Every external collaborator - scanners, broadcasters, bridges - plugs
//! into the coordinator through the single [`Agent`] contract. The
//! scheduler assumes nothing about an agent's internals, only its result.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Structured output returned by an agent on success.
pub type AgentOutput = HashMap<String, Value>;

/// Handler the coordinator dispatches tasks into.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Performs one operation.
    ///
    /// # Arguments
    ///
    /// * `task_type` - The operation to perform (e.g. "scan_dependencies")
    /// * `parameters` - Opaque parameters from the task definition
    ///
    /// # Returns
    ///
    /// Structured output on success, or an error the retry executor treats
    /// as a failed attempt.
    async fn execute(
        &self,
        task_type: &str,
        parameters: &HashMap<String, Value>,
    ) -> anyhow::Result<AgentOutput>;
}

/// Agent backed by an async closure, for tests and simple integrations.
///
/// # Example
///
/// ```ignore
/// let agent = FunctionAgent::new(|task_type, _params| async move {
///     Ok(HashMap::from([("ran".to_string(), json!(task_type))]))
/// });
/// ```
pub struct FunctionAgent {
    f: Box<
        dyn Fn(
                String,
                HashMap<String, Value>,
            ) -> Pin<Box<dyn Future<Output = anyhow::Result<AgentOutput>> + Send>>
            + Send
            + Sync,
    >,
}

impl FunctionAgent {
    /// Creates an agent from an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(String, HashMap<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<AgentOutput>> + Send + 'static,
    {
        Self {
            f: Box::new(move |task_type, params| {
                Box::pin(f(task_type, params))
                    as Pin<Box<dyn Future<Output = anyhow::Result<AgentOutput>> + Send>>
            }),
        }
    }
}

#[async_trait]
impl Agent for FunctionAgent {
    async fn execute(
        &self,
        task_type: &str,
        parameters: &HashMap<String, Value>,
    ) -> anyhow::Result<AgentOutput> {
        (self.f)(task_type.to_string(), parameters.clone()).await
    }
}

/// Name-to-handler registry the coordinator dispatches into.
///
/// Registration overwrites any prior handler under the same name (last
/// writer wins). The registry is read-mostly: writes happen at wiring time,
/// reads on every dispatch.
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<dyn Agent>>>,
}

impl AgentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a handler under a name, replacing any existing one.
    pub async fn register(&self, name: impl Into<String>, agent: Arc<dyn Agent>) {
        self.agents.write().await.insert(name.into(), agent);
    }

    /// Returns the handler registered under `name`.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.read().await.get(name).cloned()
    }

    /// Checks whether a handler is registered under `name`.
    pub async fn contains(&self, name: &str) -> bool {
        self.agents.read().await.contains_key(name)
    }

    /// Returns the registered agent names.
    pub async fn names(&self) -> Vec<String> {
        self.agents.read().await.keys().cloned().collect()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
