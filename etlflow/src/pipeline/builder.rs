//! Pipeline builder with validation.

use super::{RetryPolicy, StageDefinition, StageGraph};
use crate::errors::{ContractErrorInfo, CycleDetectedError, PipelineValidationError};
use crate::stages::Stage;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Builder for creating validated pipelines.
///
/// Stages may be declared in any order; dependencies are resolved and checked
/// for cycles in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<StageDefinition>,
    default_retry: RetryPolicy,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            default_retry: RetryPolicy::default(),
        }
    }

    /// Sets the retry policy for stages added through [`stage`](Self::stage).
    #[must_use]
    pub fn with_default_retry(mut self, policy: RetryPolicy) -> Self {
        self.default_retry = policy;
        self
    }

    /// Adds a retryable stage under the default retry policy.
    #[must_use]
    pub fn stage(self, name: impl Into<String>, runner: Arc<dyn Stage>, dependencies: &[&str]) -> Self {
        let def = StageDefinition::new(name, runner)
            .with_dependencies(dependencies.iter().copied())
            .with_retry(self.default_retry);
        self.add_stage(def)
    }

    /// Adds a fully specified stage.
    #[must_use]
    pub fn add_stage(mut self, def: StageDefinition) -> Self {
        self.stages.push(def);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of declared stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Validates the declarations and builds the graph.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty pipeline, a duplicate stage name, a self or
    /// unknown dependency, or a dependency cycle.
    pub fn build(self) -> Result<StageGraph, PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages").with_error_info(
                ContractErrorInfo::new("CONTRACT-004-EMPTY", "Cannot build an empty pipeline")
                    .with_suggested_fix(),
            ));
        }

        let mut stages: HashMap<String, StageDefinition> = HashMap::with_capacity(self.stages.len());
        let mut order = Vec::with_capacity(self.stages.len());
        for def in self.stages {
            def.validate()?;
            if stages.contains_key(&def.name) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' is declared more than once",
                    def.name
                ))
                .with_stages(vec![def.name.clone()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "CONTRACT-004-DUPLICATE",
                        format!("Duplicate stage name '{}'", def.name),
                    )
                    .with_suggested_fix()
                    .with_context_entry("stage", def.name.clone()),
                ));
            }
            order.push(def.name.clone());
            stages.insert(def.name.clone(), def);
        }

        for name in &order {
            let def = &stages[name];
            if let Some(dep) = def.dependencies.iter().find(|d| !stages.contains_key(*d)) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{name}' depends on unknown stage '{dep}'"
                ))
                .with_stages(vec![name.clone(), dep.clone()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "CONTRACT-004-MISSING_DEP",
                        format!("Dependency '{dep}' not found"),
                    )
                    .with_fix_hint("Declare the dependency as a stage or fix the stage name."),
                ));
            }
        }

        detect_cycles(&stages, &order)?;

        Ok(StageGraph::new(self.name, stages, order))
    }
}

/// Detects cycles in the dependency graph, reporting the first in declaration order.
fn detect_cycles(stages: &HashMap<String, StageDefinition>, order: &[String]) -> Result<(), CycleDetectedError> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for name in order {
        if !visited.contains(name.as_str()) {
            if let Some(cycle) = dfs_cycle(stages, name, &mut visited, &mut rec_stack, &mut path) {
                return Err(CycleDetectedError::new(cycle));
            }
        }
    }

    Ok(())
}

fn dfs_cycle<'a>(
    stages: &'a HashMap<String, StageDefinition>,
    node: &'a str,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(def) = stages.get(node) {
        for dep in &def.dependencies {
            if rec_stack.contains(dep.as_str()) {
                let start = path.iter().position(|n| *n == dep.as_str()).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(ToString::to_string).collect();
                cycle.push(dep.clone());
                return Some(cycle);
            }
            if !visited.contains(dep.as_str()) {
                if let Some(cycle) = dfs_cycle(stages, dep, visited, rec_stack, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    rec_stack.remove(node);
    None
}
