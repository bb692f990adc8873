//! DAG representation of a workflow's dependency structure using petgraph.
//!
//! Provides cycle detection, ready-set computation, and dependent
//! traversal for failure propagation.

use crate::error::{Result, WorkflowError};
use crate::workflow::task::{Task, TaskDefinition, TaskId, TaskStatus};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};

/// Directed acyclic graph over a workflow's tasks.
///
/// Nodes carry task IDs; an edge `a -> b` means `b` depends on `a`
/// (`a` must fully complete before `b` may start). The graph is immutable
/// after construction, which happens once per workflow at creation time.
pub struct TaskGraph {
    graph: DiGraph<TaskId, ()>,
    node_map: HashMap<TaskId, NodeIndex>,
}

impl TaskGraph {
    /// Builds the dependency graph from task definitions.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::EmptyWorkflow`] when no tasks are given
    /// - [`WorkflowError::DuplicateTaskId`] when two tasks share an ID
    /// - [`WorkflowError::MissingDependency`] when a dependency references
    ///   an ID outside the workflow
    /// - [`WorkflowError::CycleDetected`] when the dependency relation is
    ///   not acyclic, naming the tasks involved
    pub fn build(definitions: &[TaskDefinition]) -> Result<Self> {
        if definitions.is_empty() {
            return Err(WorkflowError::EmptyWorkflow);
        }

        let mut graph = DiGraph::new();
        let mut node_map: HashMap<TaskId, NodeIndex> = HashMap::new();

        for def in definitions {
            if node_map.contains_key(&def.id) {
                return Err(WorkflowError::DuplicateTaskId(def.id.clone()));
            }
            let idx = graph.add_node(def.id.clone());
            node_map.insert(def.id.clone(), idx);
        }

        for def in definitions {
            let to = node_map[&def.id];
            for dep in &def.dependencies {
                let from = *node_map.get(dep).ok_or_else(|| {
                    WorkflowError::MissingDependency {
                        task: def.id.clone(),
                        dependency: dep.clone(),
                    }
                })?;
                graph.add_edge(from, to, ());
            }
        }

        let built = Self { graph, node_map };
        if toposort(&built.graph, None).is_err() {
            return Err(WorkflowError::CycleDetected(built.cycle_members()));
        }
        Ok(built)
    }

    /// Returns the tasks eligible to run: Pending with every dependency
    /// Completed. Ordered by priority (highest first), then declaration
    /// index, which keeps dispatch order stable across recomputations.
    pub fn ready_tasks(&self, tasks: &HashMap<TaskId, Task>) -> Vec<TaskId> {
        let mut ready: Vec<&Task> = tasks
            .values()
            .filter(|task| task.status == TaskStatus::Pending)
            .filter(|task| {
                self.dependencies_of(task.id()).iter().all(|dep| {
                    tasks
                        .get(dep)
                        .map(|t| t.status == TaskStatus::Completed)
                        .unwrap_or(false)
                })
            })
            .collect();

        ready.sort_by(|a, b| {
            b.definition
                .priority
                .cmp(&a.definition.priority)
                .then(a.index.cmp(&b.index))
        });
        ready.into_iter().map(|task| task.id().clone()).collect()
    }

    /// Returns the direct dependencies of a task.
    pub fn dependencies_of(&self, id: &TaskId) -> Vec<TaskId> {
        self.neighbors(id, petgraph::Direction::Incoming)
    }

    /// Returns the direct dependents of a task.
    pub fn dependents_of(&self, id: &TaskId) -> Vec<TaskId> {
        self.neighbors(id, petgraph::Direction::Outgoing)
    }

    /// Returns all direct and transitive dependents of a task.
    ///
    /// Used to propagate a failure: everything downstream of a failed or
    /// cancelled task can never become ready.
    pub fn dependents_transitive(&self, id: &TaskId) -> Vec<TaskId> {
        let start = match self.node_map.get(id) {
            Some(idx) => *idx,
            None => return Vec::new(),
        };

        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            for neighbor in self
                .graph
                .neighbors_directed(current, petgraph::Direction::Outgoing)
            {
                if visited.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }

        visited
            .into_iter()
            .filter_map(|idx| self.graph.node_weight(idx).cloned())
            .collect()
    }

    /// Returns the number of tasks in the graph.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Checks if a task ID exists in the graph.
    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.node_map.contains_key(id)
    }

    fn neighbors(&self, id: &TaskId, direction: petgraph::Direction) -> Vec<TaskId> {
        self.node_map
            .get(id)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, direction)
                    .filter_map(|n| self.graph.node_weight(n).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names the tasks involved in cycles, for error reporting.
    ///
    /// Uses strongly connected components; a self-loop is a single-node SCC
    /// with an edge to itself.
    fn cycle_members(&self) -> Vec<TaskId> {
        let sccs = petgraph::algo::tarjan_scc(&self.graph);

        sccs.into_iter()
            .filter(|scc| {
                scc.len() > 1 || scc.iter().any(|&idx| self.graph.contains_edge(idx, idx))
            })
            .flat_map(|scc| {
                scc.into_iter()
                    .filter_map(|idx| self.graph.node_weight(idx).cloned())
            })
            .collect()
    }
}
