//! Stage definitions.

use super::RetryPolicy;
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::stages::Stage;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A stage declared in a pipeline: its runner, dependencies and retry policy.
#[derive(Debug, Clone)]
pub struct StageDefinition {
    /// The unique name of the stage.
    pub name: String,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
    /// Names of stages that must succeed first.
    pub dependencies: BTreeSet<String>,
    /// Whether transient failures are retried.
    pub retryable: bool,
    /// Retry policy applied when `retryable` is set.
    pub retry: RetryPolicy,
}

impl StageDefinition {
    /// Creates a retryable definition with the default policy.
    #[must_use]
    pub fn new(name: impl Into<String>, runner: Arc<dyn Stage>) -> Self {
        Self {
            name: name.into(),
            runner,
            dependencies: BTreeSet::new(),
            retryable: true,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.insert(dep.into());
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Runs the stage at most once.
    #[must_use]
    pub fn not_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }

    /// The policy actually applied at run time.
    #[must_use]
    pub fn effective_retry(&self) -> RetryPolicy {
        if self.retryable {
            self.retry
        } else {
            RetryPolicy::no_retry()
        }
    }

    /// Validates the definition on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or the stage depends on itself.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Stage name cannot be empty"));
        }
        if self.dependencies.contains(&self.name) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' cannot depend on itself",
                self.name
            ))
            .with_stages(vec![self.name.clone()])
            .with_error_info(
                ContractErrorInfo::new(
                    "CONTRACT-004-MISSING_DEP",
                    format!("Stage '{}' lists itself as a dependency", self.name),
                )
                .with_fix_hint("Remove the self-reference from the dependency list."),
            ));
        }
        Ok(())
    }
}
