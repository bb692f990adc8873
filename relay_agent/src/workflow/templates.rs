//! Named workflow templates.
//!
//! A template is an ordered list of task definitions the coordinator can
//! expand without the caller specifying tasks individually. The catalog is
//! configuration, not protocol: new templates can be registered (in code or
//! from YAML) without touching the scheduler.

use crate::error::{Result, WorkflowError};
use crate::workflow::task::{TaskDefinition, TaskPriority};
use serde_json::json;
use std::collections::HashMap;

/// Catalog mapping template names to task-definition lists.
pub struct TemplateCatalog {
    templates: HashMap<String, Vec<TaskDefinition>>,
}

impl TemplateCatalog {
    /// Creates a catalog pre-loaded with the built-in templates.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.register("full_sync", full_sync_template());
        catalog
    }

    /// Creates an empty catalog.
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Registers a template, replacing any existing one with the same name.
    pub fn register(&mut self, name: impl Into<String>, tasks: Vec<TaskDefinition>) {
        self.templates.insert(name.into(), tasks);
    }

    /// Registers a template parsed from a YAML list of task definitions.
    pub fn register_yaml(&mut self, name: impl Into<String>, yaml: &str) -> Result<()> {
        let tasks: Vec<TaskDefinition> = serde_yaml::from_str(yaml)?;
        self.register(name, tasks);
        Ok(())
    }

    /// Expands a template into its task definitions.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::UnknownTemplate`] when no template is registered
    /// under `name`.
    pub fn expand(&self, name: &str) -> Result<Vec<TaskDefinition>> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownTemplate(name.to_string()))
    }

    /// Returns the registered template names.
    pub fn names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// The built-in full synchronization template.
///
/// Validates schemas first, fans out to the web and Roblox sync tasks in
/// parallel, then verifies the combined result.
fn full_sync_template() -> Vec<TaskDefinition> {
    vec![
        TaskDefinition::new("validate_schemas", "validate_schemas", "schema_validator")
            .with_name("Validate shared schemas")
            .with_priority(TaskPriority::Critical),
        TaskDefinition::new("sync_web_channels", "broadcast_channels", "channel_broadcaster")
            .with_name("Sync web channels")
            .with_platform("web")
            .depends_on("validate_schemas")
            .with_parameter("scope", json!("all")),
        TaskDefinition::new("sync_roblox_plugin", "push_plugin_state", "roblox_bridge")
            .with_name("Sync Roblox plugin")
            .with_platform("roblox")
            .depends_on("validate_schemas"),
        TaskDefinition::new("verify_full_sync", "verify_sync", "sync_verifier")
            .with_name("Verify full sync")
            .with_priority(TaskPriority::High)
            .depends_on("sync_web_channels")
            .depends_on("sync_roblox_plugin"),
    ]
}
