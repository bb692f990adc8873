//! Workflow orchestration for integration agents.
//!
//! The workflow module provides a DAG-based task scheduling system that:
//! - Dispatches ready tasks to registered agents, concurrently when tasks
//!   are mutually independent
//! - Validates workflows for cycles and dangling dependencies before
//!   anything is stored
//! - Wraps every agent call in the retry executor with a per-agent circuit
//!   breaker
//! - Supports cooperative cancellation and per-status queries
//!
//! # Architecture
//!
//! The system is built around three core pieces:
//! - [`TaskGraph`](crate::workflow::dag::TaskGraph): dependency structure,
//!   ready-set computation, failure propagation
//! - [`Agent`](crate::workflow::agent::Agent): the single contract every
//!   external collaborator implements
//! - [`Coordinator`](crate::workflow::coordinator::Coordinator): workflow
//!   store and round-based scheduling loop
//!
//! # Execution Model
//!
//! The coordinator repeats scheduling rounds until no task can become
//! ready:
//! 1. Compute the ready set (Pending tasks whose dependencies all
//!    completed), ordered by priority then declaration order
//! 2. Dispatch the whole round concurrently through the retry executor
//! 3. Wait for every dispatch to settle, recording results and skipping
//!    the dependents of failed tasks
//!
//! A task therefore never starts before its dependencies have fully
//! completed, and a failed task never aborts its siblings.

pub mod agent;
pub mod cancellation;
pub mod coordinator;
pub mod dag;
pub mod state;
pub mod task;
pub mod templates;
pub mod validate;

// Re-export core types for public API
pub use agent::{Agent, AgentOutput, AgentRegistry, FunctionAgent};
pub use cancellation::{CancellationToken, CancellationTokenSource};
pub use coordinator::{Coordinator, CoordinatorConfig, WorkflowRunReport, WorkflowSource};
pub use dag::TaskGraph;
pub use state::{StatusSummary, Workflow, WorkflowStatus};
pub use task::{Task, TaskDefinition, TaskId, TaskPriority, TaskStatus};
pub use templates::TemplateCatalog;
pub use validate::{ValidationReport, WorkflowValidator};
