//! Task identifiers, status, and definitions for workflow scheduling.
//!
//! Defines the caller-facing [`TaskDefinition`] used to build workflows and
//! the runtime [`Task`] record the coordinator tracks during execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Unique identifier for a workflow task.
///
/// TaskId wraps a string identifier and implements the necessary traits
/// for use as a HashMap key and graph node identifier. IDs are explicit
/// and caller-assigned; the coordinator rejects duplicates at creation.
#[derive(Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a new TaskId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the TaskId and returns the underlying string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Dispatch priority among ready tasks.
///
/// Higher priorities dispatch first; ties fall back to declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

/// Lifecycle status of an individual task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies to complete
    Pending,
    /// All dependencies completed; eligible for dispatch
    Ready,
    /// Handed to its agent handler
    Running,
    /// Handler returned successfully
    Completed,
    /// Handler failed after exhausting retries
    Failed,
    /// An upstream dependency failed or was cancelled
    Skipped,
    /// The owning workflow was cancelled before this task ran
    Cancelled,
}

impl TaskStatus {
    /// Returns whether the task can no longer change status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::Failed
                | TaskStatus::Skipped
                | TaskStatus::Cancelled
        )
    }
}

fn default_max_retries() -> u32 {
    2
}

/// Caller-facing definition of one task in a workflow.
///
/// Definitions are plain data: templates and YAML files deserialize into
/// them, and the coordinator turns them into runtime [`Task`] records.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Unique (within the workflow) caller-assigned identifier
    pub id: TaskId,
    /// Human-readable name (may be empty)
    #[serde(default)]
    pub name: String,
    /// Operation the agent should perform (e.g. "scan_dependencies")
    pub task_type: String,
    /// Registry name of the agent that executes this task
    pub agent: String,
    /// Informational platform tag (e.g. "web", "roblox")
    #[serde(default)]
    pub platform: String,
    /// Dispatch priority among ready tasks
    #[serde(default)]
    pub priority: TaskPriority,
    /// Opaque parameters forwarded to the agent
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    /// IDs of tasks that must complete before this one starts
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// Retry attempts allowed on top of the initial call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl TaskDefinition {
    /// Creates a definition with default priority, no dependencies, and
    /// empty parameters.
    pub fn new(
        id: impl Into<TaskId>,
        task_type: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.as_str().to_string(),
            id,
            task_type: task_type.into(),
            agent: agent.into(),
            platform: String::new(),
            priority: TaskPriority::default(),
            parameters: HashMap::new(),
            dependencies: Vec::new(),
            max_retries: default_max_retries(),
        }
    }

    /// Sets the human-readable name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the platform tag.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Sets the dispatch priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Adds one dependency.
    pub fn depends_on(mut self, id: impl Into<TaskId>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// Adds one parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Sets the allowed retry attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Runtime record of a task within a workflow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    /// The definition this task was built from
    pub definition: TaskDefinition,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// Agent output, set on completion
    pub result: Option<HashMap<String, Value>>,
    /// Failure message, set when the task fails
    pub error: Option<String>,
    /// Retries consumed during execution
    pub retry_count: u32,
    /// Declaration position, used as the stable dispatch tie-break
    pub(crate) index: usize,
}

impl Task {
    /// Creates a Pending task from its definition and declaration position.
    pub(crate) fn from_definition(definition: TaskDefinition, index: usize) -> Self {
        Self {
            definition,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            retry_count: 0,
            index,
        }
    }

    /// Returns the task's identifier.
    pub fn id(&self) -> &TaskId {
        &self.definition.id
    }
}
