//! Stage trait and implementations.
//!
//! Stages are the units of work in a pipeline. A stage reads datasets produced
//! by its dependencies through the [`RunContext`], performs its side effect and
//! registers what it produced. Stages know nothing about retries: the graph
//! wraps every call in the stage's retry policy.

mod download;
mod ingest;
mod persist;
mod report;
mod transform;
mod validate;

pub use download::DownloadStage;
pub use ingest::IngestStage;
pub use persist::PersistStage;
pub use report::{
    summarize_quantities, LogReportSink, ProductTotal, QuantityReport, ReportSink, ReportStage,
};
pub use transform::TransformStage;
pub use validate::ValidateStage;

use crate::context::RunContext;
use crate::errors::StageError;
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Runs the stage once.
    ///
    /// Running again with the same inputs must leave datasets equivalent to a
    /// single run: outputs are replaced, never appended.
    async fn run(&self, ctx: &RunContext) -> Result<(), StageError>;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&RunContext) -> Result<(), StageError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&RunContext) -> Result<(), StageError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&RunContext) -> Result<(), StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&RunContext) -> Result<(), StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), StageError> {
        (self.func)(ctx)
    }
}

/// A stage that does nothing.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &RunContext) -> Result<(), StageError> {
        Ok(())
    }
}
