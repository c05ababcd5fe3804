//! The outcome of one stage within a pipeline run.

use super::{FailureKind, StageStatus};
use crate::errors::StageError;
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};

/// Failure details carried by a failed [`StageResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// What kind of failure occurred.
    pub kind: FailureKind,
    /// Human-readable error detail.
    pub message: String,
    /// The failing validation rule, for validation failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl StageFailure {
    /// Creates a failure record.
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            rule: None,
        }
    }
}

impl From<&StageError> for StageFailure {
    fn from(err: &StageError) -> Self {
        let rule = match err {
            StageError::Validation { rule, .. } => Some(rule.clone()),
            _ => None,
        };
        Self {
            kind: err.kind(),
            message: err.to_string(),
            rule,
        }
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// The final outcome of a stage, produced once by the retry boundary.
///
/// Fields are private so a result cannot change after it is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    stage_name: String,
    status: StageStatus,
    attempts_used: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<StageFailure>,
    started_at: Timestamp,
    finished_at: Timestamp,
}

impl StageResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(
        stage_name: impl Into<String>,
        attempts_used: u32,
        started_at: Timestamp,
        finished_at: Timestamp,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Success,
            attempts_used,
            error: None,
            started_at,
            finished_at,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(
        stage_name: impl Into<String>,
        attempts_used: u32,
        error: StageFailure,
        started_at: Timestamp,
        finished_at: Timestamp,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Failed,
            attempts_used,
            error: Some(error),
            started_at,
            finished_at,
        }
    }

    /// The stage name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// The final status.
    #[must_use]
    pub fn status(&self) -> StageStatus {
        self.status
    }

    /// How many times the stage action was invoked.
    #[must_use]
    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    /// The failure, if the stage failed.
    #[must_use]
    pub fn error(&self) -> Option<&StageFailure> {
        self.error.as_ref()
    }

    /// When the first attempt started.
    #[must_use]
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// When the last attempt finished.
    #[must_use]
    pub fn finished_at(&self) -> Timestamp {
        self.finished_at
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Wall-clock duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
