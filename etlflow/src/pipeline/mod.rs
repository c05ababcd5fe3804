//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage definitions with per-stage retry policies
//! - A builder that validates declarations and rejects cycles
//! - The sequential DAG executor and the record of each run

mod builder;
mod dag;
mod retry;
mod run;
mod spec;


pub use builder::PipelineBuilder;
pub use dag::StageGraph;
pub use retry::{with_retry, Attempted, RetryDecision, RetryPolicy};
pub use run::{PipelineRun, RunOutcome};
pub use spec::StageDefinition;
