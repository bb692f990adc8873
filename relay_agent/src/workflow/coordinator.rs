//! Workflow coordinator: builds, schedules, and supervises workflows.
//!
//! The coordinator owns the workflow store and dispatches ready tasks to
//! registered agents in concurrent rounds. A round is the current ready
//! set; the next ready set is computed only after every dispatch of the
//! round has settled, so a task never starts before its dependencies have
//! fully completed.

use crate::error::{Result, WorkflowError};
use crate::workflow::agent::{Agent, AgentOutput, AgentRegistry};
use crate::workflow::cancellation::CancellationTokenSource;
use crate::workflow::dag::TaskGraph;
use crate::workflow::state::{StatusSummary, Workflow, WorkflowStatus};
use crate::workflow::task::{TaskDefinition, TaskId, TaskStatus};
use crate::workflow::templates::TemplateCatalog;
use crate::workflow::validate::WorkflowValidator;
use chrono::Utc;
use relay_core::{
    BreakerConfig, BreakerRegistry, EventBus, IntegrationEvent, IntegrationMetrics,
    RetryExecutor, RetryPolicy,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Source of tasks for a new workflow.
pub enum WorkflowSource {
    /// Expand a named template from the catalog
    Template(String),
    /// Use caller-supplied task definitions
    Tasks(Vec<TaskDefinition>),
}

/// Tunables for the coordinator.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Per-agent circuit breaker configuration
    pub breaker: BreakerConfig,
    /// Backoff schedule applied between retry attempts
    pub retry_policy: RetryPolicy,
    /// Optional wall-clock limit per task dispatch (retries included);
    /// `None` leaves tasks unbounded
    pub task_timeout: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            breaker: BreakerConfig::default(),
            retry_policy: RetryPolicy::default(),
            task_timeout: None,
        }
    }
}

/// Final report of one workflow execution.
#[derive(Clone, Debug)]
pub struct WorkflowRunReport {
    /// The executed workflow
    pub workflow_id: String,
    /// Whether every task ended Completed or Skipped with no failures
    pub success: bool,
    /// Number of tasks that ended Completed
    pub completed_tasks: usize,
    /// First failure's message, if any task failed or the run was cancelled
    pub error: Option<String>,
    /// Wall-clock execution time
    pub elapsed: Duration,
}

/// Outcome of one task dispatch, joined back into the scheduling loop.
type DispatchOutcome = (TaskId, std::result::Result<AgentOutput, String>, u32);

/// Orchestrates workflows across registered agents.
///
/// The coordinator is an owned value: construct one, wire agents into it,
/// and drop it to shut everything down. There is no process-wide instance.
///
/// # Example
///
/// ```ignore
/// let coordinator = Coordinator::new();
/// coordinator.register_agent("schema_validator", Arc::new(validator)).await;
///
/// let id = coordinator
///     .create_workflow("nightly", "Nightly sync", WorkflowSource::Template("full_sync".into()))
///     .await?;
/// let report = coordinator.execute_workflow(&id).await?;
/// ```
pub struct Coordinator {
    agents: AgentRegistry,
    templates: RwLock<TemplateCatalog>,
    executor: Arc<RetryExecutor>,
    event_bus: Arc<EventBus>,
    metrics: IntegrationMetrics,
    workflows: Mutex<HashMap<String, Workflow>>,
    cancellations: Mutex<HashMap<String, CancellationTokenSource>>,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Creates a coordinator with default configuration and the built-in
    /// template catalog.
    pub fn new() -> Self {
        Self::with_config(CoordinatorConfig::default())
    }

    /// Creates a coordinator with explicit configuration.
    pub fn with_config(config: CoordinatorConfig) -> Self {
        let metrics = IntegrationMetrics::new();
        let breakers = Arc::new(BreakerRegistry::new(config.breaker.clone()));
        let executor = Arc::new(
            RetryExecutor::new(Arc::clone(&breakers), metrics.clone())
                .with_policy(config.retry_policy.clone()),
        );
        let event_bus = Arc::new(EventBus::new(metrics.clone()));

        Self {
            agents: AgentRegistry::new(),
            templates: RwLock::new(TemplateCatalog::builtin()),
            executor,
            event_bus,
            metrics,
            workflows: Mutex::new(HashMap::new()),
            cancellations: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Returns the event bus carrying workflow and task events.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Returns the shared metrics accumulator.
    pub fn metrics(&self) -> &IntegrationMetrics {
        &self.metrics
    }

    /// Returns the per-agent breaker registry.
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        self.executor.breakers()
    }

    /// Registers an agent handler under a name (last writer wins).
    pub async fn register_agent(&self, name: impl Into<String>, agent: Arc<dyn Agent>) {
        self.agents.register(name, agent).await;
    }

    /// Registers a workflow template, replacing any existing one.
    pub fn register_template(&self, name: impl Into<String>, tasks: Vec<TaskDefinition>) {
        self.templates.write().unwrap().register(name, tasks);
    }

    /// Creates a workflow from a template or explicit task definitions.
    ///
    /// The definitions are validated (duplicate IDs, dangling dependency
    /// references, cycles) before anything is stored; on failure nothing
    /// is created.
    ///
    /// # Returns
    ///
    /// The new workflow's ID. The workflow is stored in Pending status.
    pub async fn create_workflow(
        &self,
        name: &str,
        description: &str,
        source: WorkflowSource,
    ) -> Result<String> {
        let definitions = match source {
            WorkflowSource::Template(template) => {
                self.templates.read().unwrap().expand(&template)?
            }
            WorkflowSource::Tasks(definitions) => definitions,
        };

        let report = WorkflowValidator::new().validate(&definitions)?;
        if !report.is_valid() {
            return Err(report.into_error());
        }

        let workflow = Workflow::new(name, description, definitions);
        let workflow_id = workflow.id.clone();
        let task_count = workflow.tasks.len();
        self.workflows
            .lock()
            .unwrap()
            .insert(workflow_id.clone(), workflow);

        tracing::info!(workflow = %workflow_id, tasks = task_count, "workflow created");
        self.publish_event(
            "workflow.created",
            &workflow_id,
            json!({ "name": name, "task_count": task_count }),
        )
        .await;

        Ok(workflow_id)
    }

    /// Executes a Pending workflow to completion.
    ///
    /// Task-level failures never escape this call: a failed task is
    /// recorded on the task, its transitive dependents become Skipped, and
    /// the run continues until no task can become ready. The returned
    /// report summarizes the outcome.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::NotFound`] for an unknown workflow ID
    /// - [`WorkflowError::NotRunnable`] when the workflow is already
    ///   running or terminal
    pub async fn execute_workflow(&self, workflow_id: &str) -> Result<WorkflowRunReport> {
        self.execute_workflow_with(workflow_id, HashMap::new()).await
    }

    /// Executes a workflow with run-level parameters.
    ///
    /// Run-level parameters act as defaults for every task; a task's own
    /// parameters win on key collisions.
    pub async fn execute_workflow_with(
        &self,
        workflow_id: &str,
        parameters: HashMap<String, Value>,
    ) -> Result<WorkflowRunReport> {
        let started = Instant::now();
        let cancellation = CancellationTokenSource::new();
        let token = cancellation.token();

        // Claim the workflow and freeze its dependency graph.
        let graph = {
            let mut workflows = self.workflows.lock().unwrap();
            let workflow = workflows
                .get_mut(workflow_id)
                .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;
            if workflow.status != WorkflowStatus::Pending {
                return Err(WorkflowError::NotRunnable {
                    workflow: workflow_id.to_string(),
                    status: workflow.status,
                });
            }
            let graph = TaskGraph::build(&workflow.definitions_in_order())?;
            workflow.status = WorkflowStatus::Running;
            workflow.started_at = Some(Utc::now());
            graph
        };
        self.cancellations
            .lock()
            .unwrap()
            .insert(workflow_id.to_string(), cancellation);

        tracing::info!(workflow = %workflow_id, "workflow started");
        self.publish_event("workflow.started", workflow_id, json!({})).await;

        let mut first_error: Option<String> = None;

        loop {
            if token.is_cancelled() {
                break;
            }

            // Next round: the current ready set.
            let round = self.claim_ready_round(workflow_id, &graph);
            if round.is_empty() {
                break;
            }

            let round_ids: Vec<TaskId> = round.iter().map(|def| def.id.clone()).collect();
            let mut join_set: JoinSet<DispatchOutcome> = JoinSet::new();

            for definition in round {
                if !self.mark_running(workflow_id, &definition.id) {
                    // Cancelled between ready computation and dispatch
                    continue;
                }
                self.publish_event(
                    "task.started",
                    workflow_id,
                    json!({ "task_id": definition.id.as_str(), "agent": definition.agent }),
                )
                .await;

                let agent = self.agents.get(&definition.agent).await;
                let executor = Arc::clone(&self.executor);
                let task_timeout = self.config.task_timeout;
                let run_parameters = parameters.clone();
                join_set.spawn(dispatch_task(
                    definition,
                    agent,
                    executor,
                    task_timeout,
                    run_parameters,
                ));
            }

            // Round barrier: settle every dispatch before recomputing the
            // ready set, which keeps the ordering guarantee exact.
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(outcome) => {
                        if let Some(error) =
                            self.settle_task(workflow_id, &graph, outcome).await
                        {
                            first_error.get_or_insert(error);
                        }
                    }
                    Err(join_error) => {
                        tracing::error!(workflow = %workflow_id, error = %join_error, "task dispatch aborted");
                    }
                }
            }

            // A dispatch that panicked leaves its task Running; fail it so
            // every task still reaches a terminal status.
            if let Some(error) = self.fail_stuck_tasks(workflow_id, &graph, &round_ids) {
                first_error.get_or_insert(error);
            }
        }

        let (final_status, completed_tasks) = self.finalize(workflow_id)?;
        self.cancellations.lock().unwrap().remove(workflow_id);

        match final_status {
            WorkflowStatus::Completed => {
                self.publish_event("workflow.completed", workflow_id, json!({})).await;
            }
            WorkflowStatus::Failed => {
                self.publish_event(
                    "workflow.failed",
                    workflow_id,
                    json!({ "error": first_error.clone() }),
                )
                .await;
            }
            // cancel_workflow already announced the cancellation
            _ => {}
        }

        if final_status == WorkflowStatus::Cancelled {
            first_error.get_or_insert_with(|| "workflow cancelled".to_string());
        }

        tracing::info!(
            workflow = %workflow_id,
            status = ?final_status,
            completed = completed_tasks,
            "workflow finished"
        );

        Ok(WorkflowRunReport {
            workflow_id: workflow_id.to_string(),
            success: final_status == WorkflowStatus::Completed,
            completed_tasks,
            error: first_error,
            elapsed: started.elapsed(),
        })
    }

    /// Returns a cloned snapshot of a workflow, tasks included.
    pub fn workflow_snapshot(&self, workflow_id: &str) -> Result<Workflow> {
        self.workflows
            .lock()
            .unwrap()
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))
    }

    /// Returns the workflow's status and per-status task counts.
    pub fn get_workflow_status(&self, workflow_id: &str) -> Result<StatusSummary> {
        self.workflows
            .lock()
            .unwrap()
            .get(workflow_id)
            .map(|workflow| workflow.summary())
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))
    }

    /// Cancels a workflow.
    ///
    /// Pending and Ready tasks transition to Cancelled; already-running
    /// tasks finish on their own. Cancelling an already-terminal workflow
    /// is a no-op success.
    pub async fn cancel_workflow(&self, workflow_id: &str) -> Result<()> {
        let already_terminal = {
            let mut workflows = self.workflows.lock().unwrap();
            let workflow = workflows
                .get_mut(workflow_id)
                .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;
            if workflow.status.is_terminal() {
                true
            } else {
                for task in workflow.tasks.values_mut() {
                    if matches!(task.status, TaskStatus::Pending | TaskStatus::Ready) {
                        task.status = TaskStatus::Cancelled;
                    }
                }
                workflow.status = WorkflowStatus::Cancelled;
                workflow.completed_at = Some(Utc::now());
                false
            }
        };
        if already_terminal {
            return Ok(());
        }

        if let Some(source) = self.cancellations.lock().unwrap().get(workflow_id) {
            source.cancel();
        }
        tracing::info!(workflow = %workflow_id, "workflow cancelled");
        self.publish_event("workflow.cancelled", workflow_id, json!({})).await;
        Ok(())
    }

    /// Removes a workflow from the store.
    ///
    /// Workflows are never garbage collected; this is the only way to
    /// drop one.
    pub fn remove_workflow(&self, workflow_id: &str) -> Result<()> {
        let removed = self.workflows.lock().unwrap().remove(workflow_id);
        if removed.is_none() {
            return Err(WorkflowError::NotFound(workflow_id.to_string()));
        }
        if let Some(source) = self.cancellations.lock().unwrap().remove(workflow_id) {
            source.cancel();
        }
        Ok(())
    }

    /// Marks the current ready set Ready and returns its definitions.
    fn claim_ready_round(&self, workflow_id: &str, graph: &TaskGraph) -> Vec<TaskDefinition> {
        let mut workflows = self.workflows.lock().unwrap();
        let workflow = match workflows.get_mut(workflow_id) {
            Some(workflow) if workflow.status == WorkflowStatus::Running => workflow,
            _ => return Vec::new(),
        };

        let ready = graph.ready_tasks(&workflow.tasks);
        let mut definitions = Vec::with_capacity(ready.len());
        for id in &ready {
            if let Some(task) = workflow.tasks.get_mut(id) {
                task.status = TaskStatus::Ready;
                definitions.push(task.definition.clone());
            }
        }
        definitions
    }

    /// Transitions Ready -> Running; returns false if the task is no
    /// longer dispatchable (e.g. cancelled in between).
    fn mark_running(&self, workflow_id: &str, task_id: &TaskId) -> bool {
        let mut workflows = self.workflows.lock().unwrap();
        match workflows
            .get_mut(workflow_id)
            .and_then(|workflow| workflow.tasks.get_mut(task_id))
        {
            Some(task) if task.status == TaskStatus::Ready => {
                task.status = TaskStatus::Running;
                true
            }
            _ => false,
        }
    }

    /// Records one settled dispatch and propagates failures downstream.
    ///
    /// Returns the failure message when the task failed.
    async fn settle_task(
        &self,
        workflow_id: &str,
        graph: &TaskGraph,
        (task_id, outcome, retry_count): DispatchOutcome,
    ) -> Option<String> {
        let failure = {
            let mut workflows = self.workflows.lock().unwrap();
            let workflow = workflows.get_mut(workflow_id)?;
            match outcome {
                Ok(output) => {
                    if let Some(task) = workflow.tasks.get_mut(&task_id) {
                        if task.status == TaskStatus::Running {
                            task.status = TaskStatus::Completed;
                            task.result = Some(output);
                            task.retry_count = retry_count;
                        }
                    }
                    None
                }
                Err(message) => {
                    if let Some(task) = workflow.tasks.get_mut(&task_id) {
                        if task.status == TaskStatus::Running {
                            task.status = TaskStatus::Failed;
                            task.error = Some(message.clone());
                            task.retry_count = retry_count;
                        }
                    }
                    skip_dependents(workflow, graph, &task_id);
                    Some(message)
                }
            }
        };

        match &failure {
            None => {
                self.publish_event(
                    "task.completed",
                    workflow_id,
                    json!({ "task_id": task_id.as_str() }),
                )
                .await;
            }
            Some(message) => {
                tracing::warn!(workflow = %workflow_id, task = %task_id, error = %message, "task failed");
                self.publish_event(
                    "task.failed",
                    workflow_id,
                    json!({ "task_id": task_id.as_str(), "error": message }),
                )
                .await;
            }
        }
        failure
    }

    /// Fails any round task still Running after the round settled.
    fn fail_stuck_tasks(
        &self,
        workflow_id: &str,
        graph: &TaskGraph,
        round_ids: &[TaskId],
    ) -> Option<String> {
        let mut first_error = None;
        let mut workflows = self.workflows.lock().unwrap();
        let workflow = workflows.get_mut(workflow_id)?;
        for task_id in round_ids {
            let stuck = workflow
                .tasks
                .get(task_id)
                .map(|task| task.status == TaskStatus::Running)
                .unwrap_or(false);
            if stuck {
                let message = "task dispatch aborted".to_string();
                if let Some(task) = workflow.tasks.get_mut(task_id) {
                    task.status = TaskStatus::Failed;
                    task.error = Some(message.clone());
                }
                skip_dependents(workflow, graph, task_id);
                first_error.get_or_insert(message);
            }
        }
        first_error
    }

    /// Settles the workflow's final status and returns it with the
    /// completed-task count.
    fn finalize(&self, workflow_id: &str) -> Result<(WorkflowStatus, usize)> {
        let mut workflows = self.workflows.lock().unwrap();
        let workflow = workflows
            .get_mut(workflow_id)
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;

        if workflow.status == WorkflowStatus::Running {
            let any_failed = workflow
                .tasks
                .values()
                .any(|task| task.status == TaskStatus::Failed);
            workflow.status = if any_failed {
                WorkflowStatus::Failed
            } else {
                WorkflowStatus::Completed
            };
            workflow.completed_at = Some(Utc::now());
        }

        let completed = workflow
            .tasks
            .values()
            .filter(|task| task.status == TaskStatus::Completed)
            .count();
        Ok((workflow.status, completed))
    }

    async fn publish_event(&self, event_type: &str, workflow_id: &str, payload: Value) {
        let event = IntegrationEvent::new(event_type, "coordinator", payload)
            .with_correlation_id(workflow_id);
        self.event_bus.publish(event).await;
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks every Pending transitive dependent of a failed task Skipped.
fn skip_dependents(workflow: &mut Workflow, graph: &TaskGraph, failed: &TaskId) {
    for dependent in graph.dependents_transitive(failed) {
        if let Some(task) = workflow.tasks.get_mut(&dependent) {
            if task.status == TaskStatus::Pending {
                task.status = TaskStatus::Skipped;
            }
        }
    }
}

/// Runs one task through the retry executor and reports its outcome.
async fn dispatch_task(
    definition: TaskDefinition,
    agent: Option<Arc<dyn Agent>>,
    executor: Arc<RetryExecutor>,
    task_timeout: Option<Duration>,
    run_parameters: HashMap<String, Value>,
) -> DispatchOutcome {
    let task_id = definition.id.clone();

    let agent = match agent {
        Some(agent) => agent,
        // Configuration error: fail immediately, no retry
        None => {
            return (
                task_id,
                Err(format!("no agent registered under name: {}", definition.agent)),
                0,
            );
        }
    };

    // Run-level parameters are defaults; task parameters win.
    let mut parameters = run_parameters;
    parameters.extend(definition.parameters.clone());
    let parameters = Arc::new(parameters);

    let calls = Arc::new(AtomicU32::new(0));
    let operation_calls = Arc::clone(&calls);
    let task_type = definition.task_type.clone();

    let attempt = executor.execute(
        Some(definition.agent.as_str()),
        definition.max_retries,
        move || {
            operation_calls.fetch_add(1, Ordering::SeqCst);
            let agent = Arc::clone(&agent);
            let task_type = task_type.clone();
            let parameters = Arc::clone(&parameters);
            async move { agent.execute(&task_type, &parameters).await }
        },
    );

    let outcome = match task_timeout {
        Some(limit) => match tokio::time::timeout(limit, attempt).await {
            Ok(result) => result.map_err(|err| err.to_string()),
            Err(_) => Err(format!("task timed out after {:?}", limit)),
        },
        None => attempt.await.map_err(|err| err.to_string()),
    };

    let retry_count = calls.load(Ordering::SeqCst).saturating_sub(1);
    (task_id, outcome, retry_count)
}
