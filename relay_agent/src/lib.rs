//! RelayKit agent layer - Workflow orchestration across integration agents.
//!
//! This crate schedules DAGs of interdependent tasks over pluggable agent
//! handlers, with the failure handling provided by `relay_core`:
//!
//! - Workflows are built from named templates or explicit task definitions
//!   and validated before anything is stored
//! - Ready tasks dispatch concurrently; dependents wait until their
//!   dependencies have fully completed
//! - Every agent call runs through the retry executor behind a per-agent
//!   circuit breaker
//! - Failures are contained: a failed task skips its dependents and the
//!   run always ends with every task in a terminal status
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use relay_agent::workflow::{Coordinator, FunctionAgent, WorkflowSource};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let coordinator = Coordinator::new();
//!     coordinator
//!         .register_agent(
//!             "schema_validator",
//!             Arc::new(FunctionAgent::new(|_, _| async { Ok(HashMap::new()) })),
//!         )
//!         .await;
//!
//!     let id = coordinator
//!         .create_workflow(
//!             "nightly",
//!             "Nightly sync",
//!             WorkflowSource::Template("full_sync".to_string()),
//!         )
//!         .await?;
//!     let report = coordinator.execute_workflow(&id).await?;
//!     println!("completed {} tasks", report.completed_tasks);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod workflow;

// Re-export the error type and common workflow types at the crate root
pub use error::{Result, WorkflowError};
pub use workflow::{
    Agent, AgentOutput, AgentRegistry, Coordinator, CoordinatorConfig, FunctionAgent,
    StatusSummary, Task, TaskDefinition, TaskId, TaskPriority, TaskStatus, TemplateCatalog,
    Workflow, WorkflowRunReport, WorkflowSource, WorkflowStatus,
};
