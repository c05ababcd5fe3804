//! Stage status and failure classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The final status of a stage after the retry policy has finished with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage completed successfully.
    Success,
    /// Stage failed on its last attempt.
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Classification of a stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A network or storage call failed.
    TransientIo,
    /// A validation rule rejected the data.
    Validation,
    /// A stage ran before its dependencies succeeded.
    DependencyNotSatisfied,
    /// The run was cancelled.
    Cancelled,
    /// Any other non-retryable failure.
    Fatal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransientIo => write!(f, "transient_io"),
            Self::Validation => write!(f, "validation"),
            Self::DependencyNotSatisfied => write!(f, "dependency_not_satisfied"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status_display() {
        assert_eq!(StageStatus::Success.to_string(), "success");
        assert_eq!(StageStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_stage_status_predicates() {
        assert!(StageStatus::Success.is_success());
        assert!(!StageStatus::Success.is_failure());
        assert!(StageStatus::Failed.is_failure());
    }

    #[test]
    fn test_stage_status_serialize() {
        let json = serde_json::to_string(&StageStatus::Failed).unwrap();
        assert_eq!(json, r#""failed""#);

        let deserialized: StageStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, StageStatus::Failed);
    }

    #[test]
    fn test_failure_kind_serialize() {
        let json = serde_json::to_string(&FailureKind::DependencyNotSatisfied).unwrap();
        assert_eq!(json, r#""dependency_not_satisfied""#);
        assert_eq!(FailureKind::TransientIo.to_string(), "transient_io");
    }
}
