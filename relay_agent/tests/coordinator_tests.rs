//! End-to-end coordinator tests.
//!
//! Exercises the full path: workflow creation, round-based scheduling,
//! retry/circuit-breaker handling, failure propagation, and cancellation.

use relay_agent::workflow::{
    AgentOutput, Coordinator, CoordinatorConfig, FunctionAgent, TaskDefinition, TaskId,
    TaskStatus, WorkflowSource, WorkflowStatus,
};
use relay_agent::WorkflowError;
use relay_core::{BreakerConfig, EventHandler, IntegrationEvent, RetryPolicy};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Coordinator tuned for tests: millisecond backoff, small breaker window.
fn test_coordinator() -> Coordinator {
    Coordinator::with_config(CoordinatorConfig {
        breaker: BreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_probes: 1,
        },
        retry_policy: RetryPolicy::new(vec![Duration::from_millis(1)]),
        task_timeout: None,
    })
}

/// Agent that appends "<task_type>:start" / "<task_type>:end" markers.
fn recording_agent(log: Arc<Mutex<Vec<String>>>) -> Arc<FunctionAgent> {
    Arc::new(FunctionAgent::new(move |task_type, _| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push(format!("{task_type}:start"));
            tokio::time::sleep(Duration::from_millis(10)).await;
            log.lock().unwrap().push(format!("{task_type}:end"));
            Ok(AgentOutput::new())
        }
    }))
}

fn succeeding_agent() -> Arc<FunctionAgent> {
    Arc::new(FunctionAgent::new(|_, _| async { Ok(AgentOutput::new()) }))
}

fn failing_agent(message: &'static str) -> Arc<FunctionAgent> {
    Arc::new(FunctionAgent::new(move |_, _| async move {
        Err(anyhow::anyhow!(message))
    }))
}

fn chain_of_three() -> Vec<TaskDefinition> {
    vec![
        TaskDefinition::new("task1", "step1", "worker"),
        TaskDefinition::new("task2", "step2", "worker").depends_on("task1"),
        TaskDefinition::new("task3", "step3", "worker").depends_on("task2"),
    ]
}

#[tokio::test]
async fn full_sync_template_creates_pending_workflow() {
    let coordinator = test_coordinator();

    let id = coordinator
        .create_workflow(
            "nightly",
            "Nightly full sync",
            WorkflowSource::Template("full_sync".to_string()),
        )
        .await
        .unwrap();

    let summary = coordinator.get_workflow_status(&id).unwrap();
    assert_eq!(summary.status, WorkflowStatus::Pending);
    assert_eq!(summary.total, 4);
    assert_eq!(summary.pending, 4);
}

#[tokio::test]
async fn unknown_template_fails_creation() {
    let coordinator = test_coordinator();

    let result = coordinator
        .create_workflow(
            "bad",
            "",
            WorkflowSource::Template("no_such_template".to_string()),
        )
        .await;

    assert!(matches!(result, Err(WorkflowError::UnknownTemplate(_))));
}

#[tokio::test]
async fn cyclic_workflow_fails_creation_and_stores_nothing() {
    let coordinator = test_coordinator();

    let result = coordinator
        .create_workflow(
            "cyclic",
            "",
            WorkflowSource::Tasks(vec![
                TaskDefinition::new("a", "noop", "worker").depends_on("b"),
                TaskDefinition::new("b", "noop", "worker").depends_on("a"),
            ]),
        )
        .await;

    assert!(matches!(result, Err(WorkflowError::CycleDetected(_))));
}

#[tokio::test]
async fn linear_chain_completes_in_dependency_order() {
    let coordinator = test_coordinator();
    let log = Arc::new(Mutex::new(Vec::new()));
    coordinator
        .register_agent("worker", recording_agent(Arc::clone(&log)))
        .await;

    let id = coordinator
        .create_workflow("chain", "", WorkflowSource::Tasks(chain_of_three()))
        .await
        .unwrap();
    let report = coordinator.execute_workflow(&id).await.unwrap();

    assert!(report.success);
    assert_eq!(report.completed_tasks, 3);
    assert!(report.error.is_none());

    let summary = coordinator.get_workflow_status(&id).unwrap();
    assert_eq!(summary.status, WorkflowStatus::Completed);
    assert_eq!(summary.completed, 3);

    // task1 finishes strictly before task2 starts, and so on down the chain
    let log = log.lock().unwrap();
    assert_eq!(
        *log,
        vec![
            "step1:start", "step1:end",
            "step2:start", "step2:end",
            "step3:start", "step3:end",
        ]
    );
}

#[tokio::test]
async fn independent_tasks_run_concurrently() {
    let coordinator = test_coordinator();
    let active = Arc::new(AtomicU32::new(0));
    let max_active = Arc::new(AtomicU32::new(0));

    let agent = {
        let active = Arc::clone(&active);
        let max_active = Arc::clone(&max_active);
        Arc::new(FunctionAgent::new(move |_, _| {
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(AgentOutput::new())
            }
        }))
    };
    coordinator.register_agent("worker", agent).await;

    let id = coordinator
        .create_workflow(
            "parallel",
            "",
            WorkflowSource::Tasks(vec![
                TaskDefinition::new("left", "noop", "worker"),
                TaskDefinition::new("right", "noop", "worker"),
            ]),
        )
        .await
        .unwrap();
    let report = coordinator.execute_workflow(&id).await.unwrap();

    assert!(report.success);
    assert!(
        max_active.load(Ordering::SeqCst) >= 2,
        "independent tasks should overlap"
    );
}

#[tokio::test]
async fn failed_task_skips_dependents_and_fails_workflow() {
    let coordinator = test_coordinator();
    coordinator
        .register_agent("broken", failing_agent("disk on fire"))
        .await;
    coordinator.register_agent("worker", succeeding_agent()).await;

    let id = coordinator
        .create_workflow(
            "doomed",
            "",
            WorkflowSource::Tasks(vec![
                TaskDefinition::new("task1", "noop", "broken").with_max_retries(1),
                TaskDefinition::new("task2", "noop", "worker").depends_on("task1"),
                TaskDefinition::new("bystander", "noop", "worker"),
            ]),
        )
        .await
        .unwrap();
    let report = coordinator.execute_workflow(&id).await.unwrap();

    assert!(!report.success);
    let error = report.error.unwrap();
    assert!(error.contains("disk on fire"), "got: {error}");

    let workflow = coordinator.workflow_snapshot(&id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Failed);
    assert_eq!(
        workflow.task(&TaskId::new("task1")).unwrap().status,
        TaskStatus::Failed
    );
    assert_eq!(
        workflow.task(&TaskId::new("task2")).unwrap().status,
        TaskStatus::Skipped
    );
    // A sibling with no dependency on the failure still completes
    assert_eq!(
        workflow.task(&TaskId::new("bystander")).unwrap().status,
        TaskStatus::Completed
    );
    // One initial call plus one retry were consumed
    assert_eq!(workflow.task(&TaskId::new("task1")).unwrap().retry_count, 1);
}

#[tokio::test]
async fn unregistered_agent_fails_task_without_retry() {
    let coordinator = test_coordinator();
    coordinator.register_agent("worker", succeeding_agent()).await;

    let id = coordinator
        .create_workflow(
            "misconfigured",
            "",
            WorkflowSource::Tasks(vec![
                TaskDefinition::new("ghost_task", "noop", "ghost_agent"),
                TaskDefinition::new("real_task", "noop", "worker"),
            ]),
        )
        .await
        .unwrap();
    let report = coordinator.execute_workflow(&id).await.unwrap();

    assert!(!report.success);

    let workflow = coordinator.workflow_snapshot(&id).unwrap();
    let ghost = workflow.task(&TaskId::new("ghost_task")).unwrap();
    assert_eq!(ghost.status, TaskStatus::Failed);
    assert!(ghost.error.as_ref().unwrap().contains("ghost_agent"));
    assert_eq!(ghost.retry_count, 0);
    assert_eq!(
        workflow.task(&TaskId::new("real_task")).unwrap().status,
        TaskStatus::Completed
    );
}

#[tokio::test]
async fn open_circuit_surfaces_as_task_failure() {
    let coordinator = Coordinator::with_config(CoordinatorConfig {
        breaker: BreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_probes: 1,
        },
        retry_policy: RetryPolicy::new(vec![Duration::from_millis(1)]),
        task_timeout: None,
    });
    coordinator
        .register_agent("flaky", failing_agent("connection refused"))
        .await;

    // First run trips the breaker: initial call + retry = 2 failures
    let first = coordinator
        .create_workflow(
            "first",
            "",
            WorkflowSource::Tasks(vec![
                TaskDefinition::new("call", "noop", "flaky").with_max_retries(1),
            ]),
        )
        .await
        .unwrap();
    coordinator.execute_workflow(&first).await.unwrap();

    // Second run is rejected outright by the open breaker
    let second = coordinator
        .create_workflow(
            "second",
            "",
            WorkflowSource::Tasks(vec![
                TaskDefinition::new("call", "noop", "flaky").with_max_retries(3),
            ]),
        )
        .await
        .unwrap();
    let report = coordinator.execute_workflow(&second).await.unwrap();

    assert!(!report.success);
    let workflow = coordinator.workflow_snapshot(&second).unwrap();
    let task = workflow.task(&TaskId::new("call")).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_ref().unwrap().contains("Circuit open"));
    // The rejected dispatch never reached the agent
    assert_eq!(task.retry_count, 0);
}

#[tokio::test]
async fn cancel_pending_workflow_cancels_every_task() {
    let coordinator = test_coordinator();

    let id = coordinator
        .create_workflow("parked", "", WorkflowSource::Tasks(chain_of_three()))
        .await
        .unwrap();
    coordinator.cancel_workflow(&id).await.unwrap();

    let workflow = coordinator.workflow_snapshot(&id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Cancelled);
    for task in workflow.tasks.values() {
        assert_eq!(task.status, TaskStatus::Cancelled);
    }

    // Executing a cancelled workflow is a terminal-state error
    let result = coordinator.execute_workflow(&id).await;
    assert!(matches!(result, Err(WorkflowError::NotRunnable { .. })));

    // Cancelling again is a no-op success
    coordinator.cancel_workflow(&id).await.unwrap();
}

#[tokio::test]
async fn cancel_running_workflow_lets_inflight_task_finish() {
    let coordinator = Arc::new(test_coordinator());
    coordinator
        .register_agent(
            "slow",
            Arc::new(FunctionAgent::new(|_, _| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(AgentOutput::new())
            })),
        )
        .await;

    let id = coordinator
        .create_workflow(
            "long_haul",
            "",
            WorkflowSource::Tasks(vec![
                TaskDefinition::new("inflight", "noop", "slow"),
                TaskDefinition::new("queued", "noop", "slow").depends_on("inflight"),
            ]),
        )
        .await
        .unwrap();

    let runner = {
        let coordinator = Arc::clone(&coordinator);
        let id = id.clone();
        tokio::spawn(async move { coordinator.execute_workflow(&id).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    coordinator.cancel_workflow(&id).await.unwrap();

    let report = runner.await.unwrap().unwrap();
    assert!(!report.success);

    let workflow = coordinator.workflow_snapshot(&id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Cancelled);
    // The in-flight task ran to completion; the queued one never started
    assert_eq!(
        workflow.task(&TaskId::new("inflight")).unwrap().status,
        TaskStatus::Completed
    );
    assert_eq!(
        workflow.task(&TaskId::new("queued")).unwrap().status,
        TaskStatus::Cancelled
    );
}

#[tokio::test]
async fn status_query_is_idempotent() {
    let coordinator = test_coordinator();

    let id = coordinator
        .create_workflow("stable", "", WorkflowSource::Tasks(chain_of_three()))
        .await
        .unwrap();

    let first = coordinator.get_workflow_status(&id).unwrap();
    let second = coordinator.get_workflow_status(&id).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn task_timeout_fails_slow_tasks() {
    let coordinator = Coordinator::with_config(CoordinatorConfig {
        breaker: BreakerConfig::default(),
        retry_policy: RetryPolicy::new(vec![Duration::from_millis(1)]),
        task_timeout: Some(Duration::from_millis(20)),
    });
    coordinator
        .register_agent(
            "glacial",
            Arc::new(FunctionAgent::new(|_, _| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(AgentOutput::new())
            })),
        )
        .await;

    let id = coordinator
        .create_workflow(
            "timed",
            "",
            WorkflowSource::Tasks(vec![
                TaskDefinition::new("stuck", "noop", "glacial").with_max_retries(0),
            ]),
        )
        .await
        .unwrap();
    let report = coordinator.execute_workflow(&id).await.unwrap();

    assert!(!report.success);
    let workflow = coordinator.workflow_snapshot(&id).unwrap();
    let task = workflow.task(&TaskId::new("stuck")).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_ref().unwrap().contains("timed out"));
}

struct CountingHandler {
    count: Arc<AtomicU32>,
}

#[async_trait::async_trait]
impl EventHandler for CountingHandler {
    async fn handle(&self, _event: &IntegrationEvent) -> anyhow::Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn workflow_lifecycle_emits_events() {
    let coordinator = test_coordinator();
    coordinator.register_agent("worker", succeeding_agent()).await;

    let completions = Arc::new(AtomicU32::new(0));
    coordinator
        .event_bus()
        .subscribe(
            "task.completed",
            Arc::new(CountingHandler {
                count: Arc::clone(&completions),
            }),
        )
        .await;

    let finished = Arc::new(AtomicU32::new(0));
    coordinator
        .event_bus()
        .subscribe(
            "workflow.completed",
            Arc::new(CountingHandler {
                count: Arc::clone(&finished),
            }),
        )
        .await;

    let id = coordinator
        .create_workflow("observed", "", WorkflowSource::Tasks(chain_of_three()))
        .await
        .unwrap();
    coordinator.execute_workflow(&id).await.unwrap();

    assert_eq!(completions.load(Ordering::SeqCst), 3);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    // Retry executor recorded one successful request per task
    assert_eq!(coordinator.metrics().successful_requests(), 3);
    assert!(coordinator.metrics().events_processed() > 0);
}

#[tokio::test]
async fn dependencies_can_reference_later_declarations() {
    let coordinator = test_coordinator();
    let log = Arc::new(Mutex::new(Vec::new()));
    coordinator
        .register_agent("worker", recording_agent(Arc::clone(&log)))
        .await;

    // "finish" is declared before the task it depends on; explicit IDs
    // make declaration order irrelevant
    let id = coordinator
        .create_workflow(
            "reordered",
            "",
            WorkflowSource::Tasks(vec![
                TaskDefinition::new("finish", "second", "worker").depends_on("start"),
                TaskDefinition::new("start", "first", "worker"),
            ]),
        )
        .await
        .unwrap();
    let report = coordinator.execute_workflow(&id).await.unwrap();

    assert!(report.success);
    let log = log.lock().unwrap();
    assert_eq!(
        *log,
        vec!["first:start", "first:end", "second:start", "second:end"]
    );
}

#[tokio::test]
async fn registered_template_executes_like_builtin() {
    let coordinator = test_coordinator();
    coordinator.register_agent("worker", succeeding_agent()).await;

    coordinator.register_template(
        "smoke_check",
        vec![
            TaskDefinition::new("probe", "probe", "worker"),
            TaskDefinition::new("report", "report", "worker").depends_on("probe"),
        ],
    );

    let id = coordinator
        .create_workflow(
            "smoke",
            "",
            WorkflowSource::Template("smoke_check".to_string()),
        )
        .await
        .unwrap();
    let report = coordinator.execute_workflow(&id).await.unwrap();

    assert!(report.success);
    assert_eq!(report.completed_tasks, 2);
}

#[tokio::test]
async fn run_report_measures_elapsed_time() {
    let coordinator = test_coordinator();
    coordinator
        .register_agent(
            "worker",
            Arc::new(FunctionAgent::new(|_, _| async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(AgentOutput::new())
            })),
        )
        .await;

    let id = coordinator
        .create_workflow(
            "timed",
            "",
            WorkflowSource::Tasks(vec![TaskDefinition::new("only", "noop", "worker")]),
        )
        .await
        .unwrap();
    let report = coordinator.execute_workflow(&id).await.unwrap();

    assert!(report.elapsed >= Duration::from_millis(30));
    assert_eq!(report.workflow_id, id);
}
