//! Workflow validation before creation.
//!
//! Collects every structural problem in a set of task definitions -
//! duplicate IDs, dangling dependency references, and cycles - so callers
//! see the full picture instead of the first failure.

use crate::error::{Result, WorkflowError};
use crate::workflow::task::{TaskDefinition, TaskId};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// Validation report for a workflow definition.
#[derive(Clone, Debug)]
pub struct ValidationReport {
    is_valid: bool,
    cycles: Vec<Vec<TaskId>>,
    missing_dependencies: Vec<(TaskId, TaskId)>,
    duplicate_ids: Vec<TaskId>,
}

impl ValidationReport {
    fn new() -> Self {
        Self {
            is_valid: true,
            cycles: Vec::new(),
            missing_dependencies: Vec::new(),
            duplicate_ids: Vec::new(),
        }
    }

    /// Returns whether the definitions form a valid workflow.
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Returns the cycles detected, each as the tasks involved.
    pub fn cycles(&self) -> &[Vec<TaskId>] {
        &self.cycles
    }

    /// Returns `(task, missing dependency)` pairs.
    pub fn missing_dependencies(&self) -> &[(TaskId, TaskId)] {
        &self.missing_dependencies
    }

    /// Returns IDs declared more than once.
    pub fn duplicate_ids(&self) -> &[TaskId] {
        &self.duplicate_ids
    }

    /// Converts an invalid report into the error for its first problem.
    ///
    /// Duplicates are reported before dangling references, which are
    /// reported before cycles, matching the order the checks run in.
    pub fn into_error(self) -> WorkflowError {
        if let Some(id) = self.duplicate_ids.into_iter().next() {
            return WorkflowError::DuplicateTaskId(id);
        }
        if let Some((task, dependency)) = self.missing_dependencies.into_iter().next() {
            return WorkflowError::MissingDependency { task, dependency };
        }
        if let Some(cycle) = self.cycles.into_iter().next() {
            return WorkflowError::CycleDetected(cycle);
        }
        WorkflowError::EmptyWorkflow
    }

    fn add_cycle(&mut self, cycle: Vec<TaskId>) {
        self.is_valid = false;
        self.cycles.push(cycle);
    }

    fn add_missing_dependency(&mut self, task: TaskId, dependency: TaskId) {
        self.is_valid = false;
        self.missing_dependencies.push((task, dependency));
    }

    fn add_duplicate_id(&mut self, id: TaskId) {
        self.is_valid = false;
        self.duplicate_ids.push(id);
    }
}

/// Structural validator for workflow definitions.
pub struct WorkflowValidator;

impl WorkflowValidator {
    /// Creates a new workflow validator.
    pub fn new() -> Self {
        Self
    }

    /// Validates a set of task definitions.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::EmptyWorkflow`] when no tasks are given;
    /// all other problems are collected into the report.
    pub fn validate(&self, definitions: &[TaskDefinition]) -> Result<ValidationReport> {
        if definitions.is_empty() {
            return Err(WorkflowError::EmptyWorkflow);
        }

        let mut report = ValidationReport::new();

        self.check_duplicates(definitions, &mut report);
        self.check_missing_dependencies(definitions, &mut report);
        self.check_cycles(definitions, &mut report);

        Ok(report)
    }

    fn check_duplicates(&self, definitions: &[TaskDefinition], report: &mut ValidationReport) {
        let mut seen: HashSet<&TaskId> = HashSet::new();
        for def in definitions {
            if !seen.insert(&def.id) {
                report.add_duplicate_id(def.id.clone());
            }
        }
    }

    fn check_missing_dependencies(
        &self,
        definitions: &[TaskDefinition],
        report: &mut ValidationReport,
    ) {
        let known: HashSet<&TaskId> = definitions.iter().map(|d| &d.id).collect();
        for def in definitions {
            for dep in &def.dependencies {
                if !known.contains(dep) {
                    report.add_missing_dependency(def.id.clone(), dep.clone());
                }
            }
        }
    }

    /// Detects cycles over the subset of resolvable dependency edges.
    fn check_cycles(&self, definitions: &[TaskDefinition], report: &mut ValidationReport) {
        let mut graph: DiGraph<TaskId, ()> = DiGraph::new();
        let mut nodes: HashMap<&TaskId, NodeIndex> = HashMap::new();

        for def in definitions {
            nodes
                .entry(&def.id)
                .or_insert_with(|| graph.add_node(def.id.clone()));
        }
        for def in definitions {
            let to = nodes[&def.id];
            for dep in &def.dependencies {
                if let Some(&from) = nodes.get(dep) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        for scc in petgraph::algo::tarjan_scc(&graph) {
            let is_cycle =
                scc.len() > 1 || scc.iter().any(|&idx| graph.contains_edge(idx, idx));
            if is_cycle {
                let members: Vec<TaskId> = scc
                    .iter()
                    .filter_map(|&idx| graph.node_weight(idx).cloned())
                    .collect();
                report.add_cycle(members);
            }
        }
    }
}

impl Default for WorkflowValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(id: &str, deps: &[&str]) -> TaskDefinition {
        let mut definition = TaskDefinition::new(id, "noop", "tester");
        for dep in deps {
            definition = definition.depends_on(*dep);
        }
        definition
    }

    #[test]
    fn test_valid_dag() {
        let defs = vec![def("a", &[]), def("b", &["a"]), def("c", &["a", "b"])];

        let report = WorkflowValidator::new().validate(&defs).unwrap();
        assert!(report.is_valid());
        assert!(report.cycles().is_empty());
        assert!(report.missing_dependencies().is_empty());
        assert!(report.duplicate_ids().is_empty());
    }

    #[test]
    fn test_empty_is_an_error() {
        assert!(matches!(
            WorkflowValidator::new().validate(&[]),
            Err(WorkflowError::EmptyWorkflow)
        ));
    }

    #[test]
    fn test_collects_multiple_problems() {
        let defs = vec![
            def("a", &["ghost"]),
            def("a", &[]),
            def("b", &["c"]),
            def("c", &["b"]),
        ];

        let report = WorkflowValidator::new().validate(&defs).unwrap();
        assert!(!report.is_valid());
        assert_eq!(report.duplicate_ids(), &[TaskId::new("a")]);
        assert_eq!(
            report.missing_dependencies(),
            &[(TaskId::new("a"), TaskId::new("ghost"))]
        );
        assert_eq!(report.cycles().len(), 1);
    }

    #[test]
    fn test_into_error_prefers_duplicates() {
        let defs = vec![def("a", &["ghost"]), def("a", &[])];

        let report = WorkflowValidator::new().validate(&defs).unwrap();
        assert!(matches!(
            report.into_error(),
            WorkflowError::DuplicateTaskId(_)
        ));
    }

    #[test]
    fn test_cycle_reported() {
        let defs = vec![def("a", &["b"]), def("b", &["a"])];

        let report = WorkflowValidator::new().validate(&defs).unwrap();
        assert!(!report.is_valid());
        let cycle = &report.cycles()[0];
        assert!(cycle.contains(&TaskId::new("a")));
        assert!(cycle.contains(&TaskId::new("b")));
    }
}
