//! Run and stage lifecycle events.
//!
//! The pipeline graph and the runner report progress through an [`EventSink`]
//! so operators can route lifecycle events to logs or collect them in tests.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A pipeline run began.
pub const PIPELINE_STARTED: &str = "pipeline.started";
/// Every stage succeeded.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
/// A stage failed and the run halted.
pub const PIPELINE_FAILED: &str = "pipeline.failed";
/// The run was cancelled between stages.
pub const PIPELINE_CANCELLED: &str = "pipeline.cancelled";
/// A stage is about to run.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage attempt failed and will be retried.
pub const STAGE_RETRYING: &str = "stage.retrying";
/// A stage succeeded.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage failed after its final attempt.
pub const STAGE_FAILED: &str = "stage.failed";
/// A trigger was dropped because a run was already in progress.
pub const RUN_SKIPPED: &str = "run.skipped";
