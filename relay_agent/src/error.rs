//! Error types for workflow orchestration.
//!
//! Only creation-time validation problems and store lookups surface as
//! hard call errors. Task-level runtime failures (unregistered agents,
//! open circuits, handler errors) are recorded on the task and summarized
//! in the run report instead.

use crate::workflow::state::WorkflowStatus;
use crate::workflow::task::TaskId;

/// Main error type for workflow operations.
#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    /// Dependency relation contains a cycle
    #[error("Cycle detected in workflow involving tasks: {0:?}")]
    CycleDetected(Vec<TaskId>),

    /// A task depends on an ID outside the workflow
    #[error("Task {task} depends on unknown task: {dependency}")]
    MissingDependency {
        /// The task declaring the dependency
        task: TaskId,
        /// The unresolvable dependency ID
        dependency: TaskId,
    },

    /// Two tasks share an ID
    #[error("Duplicate task ID: {0}")]
    DuplicateTaskId(TaskId),

    /// Workflow has no tasks
    #[error("Workflow cannot be empty")]
    EmptyWorkflow,

    /// No template registered under the given name
    #[error("Unknown workflow template: {0}")]
    UnknownTemplate(String),

    /// No workflow stored under the given ID
    #[error("Workflow not found: {0}")]
    NotFound(String),

    /// Workflow is already running or terminal
    #[error("Workflow {workflow} is not runnable in status {status:?}")]
    NotRunnable {
        /// The workflow ID
        workflow: String,
        /// Its current status
        status: WorkflowStatus,
    },

    /// Template definition failed to parse
    #[error("Template definition error: {0}")]
    Template(#[from] serde_yaml::Error),
}

/// Type alias for Result with WorkflowError.
pub type Result<T> = std::result::Result<T, WorkflowError>;
