//! The record of one pipeline execution.

use crate::core::{StageFailure, StageResult};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every stage succeeded.
    Success,
    /// A stage failed after its final attempt and the run halted.
    Failed {
        /// The stage that failed.
        stage: String,
        /// Its failure.
        error: StageFailure,
        /// Stages that never ran, in execution order.
        skipped: Vec<String>,
    },
    /// The run was cancelled between stages.
    Cancelled {
        /// The cancellation reason.
        reason: String,
        /// Stages that never ran, in execution order.
        skipped: Vec<String>,
    },
}

impl RunOutcome {
    /// Returns true for [`RunOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Stages that did not run.
    #[must_use]
    pub fn skipped(&self) -> &[String] {
        match self {
            Self::Success => &[],
            Self::Failed { skipped, .. } | Self::Cancelled { skipped, .. } => skipped,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed { stage, error, skipped } => write!(
                f,
                "failed at stage '{stage}': {error}; skipped: [{}]",
                skipped.join(", ")
            ),
            Self::Cancelled { reason, skipped } => {
                write!(f, "cancelled ({reason}); skipped: [{}]", skipped.join(", "))
            }
        }
    }
}

/// One execution of a pipeline: its stage results in execution order and the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Run id, shared with the run's context.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run reached its terminal state.
    pub finished_at: Timestamp,
    /// Stage results in the order the stages ran.
    pub results: Vec<StageResult>,
    /// Terminal state.
    pub outcome: RunOutcome,
}

impl PipelineRun {
    /// Returns true if every stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// The failed stage, if the run failed.
    #[must_use]
    pub fn failed_stage(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Failed { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Names of stages that ran, in order.
    #[must_use]
    pub fn executed_stages(&self) -> Vec<&str> {
        self.results.iter().map(StageResult::stage_name).collect()
    }

    /// The result recorded for `stage`.
    #[must_use]
    pub fn result(&self, stage: &str) -> Option<&StageResult> {
        self.results.iter().find(|r| r.stage_name() == stage)
    }

    /// Wall-clock duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
