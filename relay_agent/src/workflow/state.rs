//! Workflow records, status, and summaries.

use crate::workflow::task::{Task, TaskDefinition, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Status of a workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created but not yet executed
    Pending,
    /// Scheduling rounds in progress
    Running,
    /// Every task ended Completed or Skipped with no failures
    Completed,
    /// At least one task ended Failed
    Failed,
    /// Cancelled before completion
    Cancelled,
}

impl WorkflowStatus {
    /// Returns whether the workflow can no longer change status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

/// A workflow and the tasks it exclusively owns.
///
/// Workflows are created by the coordinator from a template or explicit
/// task definitions, live in the coordinator's store, and are removed only
/// by explicit request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Tasks keyed by their ID
    pub tasks: HashMap<TaskId, Task>,
    /// Current status
    pub status: WorkflowStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Set when execution starts
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the workflow reaches a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Creates a Pending workflow from validated task definitions.
    ///
    /// Declaration order is preserved as each task's dispatch tie-break.
    pub(crate) fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        definitions: Vec<TaskDefinition>,
    ) -> Self {
        let tasks = definitions
            .into_iter()
            .enumerate()
            .map(|(index, def)| (def.id.clone(), Task::from_definition(def, index)))
            .collect();

        Self {
            id: format!("wf-{}", uuid::Uuid::new_v4()),
            name: name.into(),
            description: description.into(),
            tasks,
            status: WorkflowStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Returns a task by ID.
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Returns the task definitions in declaration order.
    pub(crate) fn definitions_in_order(&self) -> Vec<TaskDefinition> {
        let mut tasks: Vec<&Task> = self.tasks.values().collect();
        tasks.sort_by_key(|task| task.index);
        tasks.iter().map(|task| task.definition.clone()).collect()
    }

    /// Returns the per-status task-count summary.
    pub fn summary(&self) -> StatusSummary {
        let mut summary = StatusSummary {
            workflow_id: self.id.clone(),
            status: self.status,
            total: self.tasks.len(),
            pending: 0,
            ready: 0,
            running: 0,
            completed: 0,
            failed: 0,
            skipped: 0,
            cancelled: 0,
        };

        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::Ready => summary.ready += 1,
                TaskStatus::Running => summary.running += 1,
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Skipped => summary.skipped += 1,
                TaskStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }
}

/// Per-status task counts for one workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    /// The workflow this summary describes
    pub workflow_id: String,
    /// Workflow status at summary time
    pub status: WorkflowStatus,
    /// Total number of tasks
    pub total: usize,
    pub pending: usize,
    pub ready: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}
