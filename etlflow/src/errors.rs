//! Error types for the etlflow engine.
//!
//! Stage-level failures are expressed as [`StageError`] values and converted
//! into failed [`StageResult`](crate::core::StageResult)s at the retry
//! boundary. Construction-time problems with a pipeline declaration surface as
//! [`PipelineValidationError`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::core::FailureKind;

/// The top-level error type for etlflow operations.
#[derive(Debug, Error)]
pub enum EtlError {
    /// The pipeline declaration is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A cycle was detected in the pipeline.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// A storage session could not be used.
    #[error("{0}")]
    Storage(#[from] StorageError),

    /// A remote file could not be fetched.
    #[error("{0}")]
    Fetch(#[from] FetchError),

    /// A dataset could not be built or decoded.
    #[error("{0}")]
    Dataset(#[from] DatasetError),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error returned by a stage's `run`.
///
/// Only [`StageError::TransientIo`] is eligible for retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    /// A network or storage call failed.
    #[error("Transient IO error: {0}")]
    TransientIo(String),

    /// A validation rule rejected the dataset.
    #[error("Validation rule '{rule}' failed: {message}")]
    Validation {
        /// The failing rule name.
        rule: String,
        /// The rule's message.
        message: String,
    },

    /// A stage was scheduled before one of its dependencies succeeded.
    #[error("Stage '{stage}' scheduled before dependency '{dependency}' succeeded")]
    DependencyNotSatisfied {
        /// The stage that was about to run.
        stage: String,
        /// The unsatisfied dependency.
        dependency: String,
    },

    /// A dataset the stage reads was never produced in this run.
    #[error("Dataset '{dataset}' is not available in this run")]
    MissingDataset {
        /// The dataset name.
        dataset: String,
    },

    /// The run was cancelled.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Any other non-retryable failure.
    #[error("{0}")]
    Fatal(String),
}

impl StageError {
    /// Creates a transient IO error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientIo(message.into())
    }

    /// Creates a fatal error.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Creates a missing dataset error.
    #[must_use]
    pub fn missing_dataset(dataset: impl Into<String>) -> Self {
        Self::MissingDataset {
            dataset: dataset.into(),
        }
    }

    /// Returns true if retrying without new input could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientIo(_))
    }

    /// Returns the failure kind recorded on a stage result.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::TransientIo(_) => FailureKind::TransientIo,
            Self::Validation { .. } => FailureKind::Validation,
            Self::DependencyNotSatisfied { .. } => FailureKind::DependencyNotSatisfied,
            Self::Cancelled(_) => FailureKind::Cancelled,
            Self::MissingDataset { .. } | Self::Fatal(_) => FailureKind::Fatal,
        }
    }
}

impl From<StorageError> for StageError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TableNotFound(table) => Self::missing_dataset(table),
            StorageError::EmptySchema(_)
            | StorageError::UnsupportedValue { .. }
            | StorageError::Dataset(_) => Self::Fatal(err.to_string()),
            StorageError::Connect(_) | StorageError::Sqlite(_) => Self::TransientIo(err.to_string()),
        }
    }
}

impl From<FetchError> for StageError {
    fn from(err: FetchError) -> Self {
        Self::TransientIo(err.to_string())
    }
}

impl From<std::io::Error> for StageError {
    fn from(err: std::io::Error) -> Self {
        Self::TransientIo(err.to_string())
    }
}

impl From<DatasetError> for StageError {
    fn from(err: DatasetError) -> Self {
        Self::Fatal(err.to_string())
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-004-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Fills the fix hint from [`ContractSuggestions`] when one exists for the code.
    #[must_use]
    pub fn with_suggested_fix(mut self) -> Self {
        if let Some(hint) = ContractSuggestions::get(&self.code) {
            self.fix_hint = Some(hint.to_string());
        }
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline declaration is rejected.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a cycle is detected in the pipeline graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of stages forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "CONTRACT-004-CYCLE",
            format!("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for PipelineValidationError {
    fn from(err: CycleDetectedError) -> Self {
        Self {
            message: err.to_string(),
            stages: err.cycle_path.clone(),
            error_info: Some(err.error_info),
        }
    }
}

/// Errors raised by a storage session.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested table does not exist.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// The storage backend could not be opened.
    #[error("Failed to open storage: {0}")]
    Connect(String),

    /// The underlying SQLite engine reported an error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A dataset without columns cannot be stored as a table.
    #[error("Table '{0}' has no columns")]
    EmptySchema(String),

    /// A stored value could not be mapped to a dataset cell.
    #[error("Unsupported value in column '{column}' of table '{table}'")]
    UnsupportedValue {
        /// The table name.
        table: String,
        /// The column name.
        column: String,
    },

    /// Stored rows could not be assembled into a dataset.
    #[error("{0}")]
    Dataset(#[from] DatasetError),
}

/// Errors raised while fetching a remote file.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be sent or the body could not be read.
    #[error("Request to {url} failed: {reason}")]
    Request {
        /// The requested URL.
        url: String,
        /// The failure reason.
        reason: String,
    },

    /// The server answered with a non-success status.
    #[error("Request to {url} returned status {status}")]
    Status {
        /// The requested URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
}

/// Errors raised while building or decoding a dataset.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatasetError {
    /// A row does not match the dataset's column count.
    #[error("Row {row} of dataset '{dataset}' has {actual} values, expected {expected}")]
    Arity {
        /// The dataset name.
        dataset: String,
        /// Zero-based row index.
        row: usize,
        /// Expected number of values.
        expected: usize,
        /// Actual number of values.
        actual: usize,
    },

    /// A referenced column does not exist.
    #[error("Dataset '{dataset}' has no column '{column}'")]
    UnknownColumn {
        /// The dataset name.
        dataset: String,
        /// The column name.
        column: String,
    },

    /// A CSV document is malformed.
    #[error("Malformed CSV in '{source_name}' at line {line}: {reason}")]
    Csv {
        /// The file or dataset name.
        source_name: String,
        /// One-based line number.
        line: usize,
        /// What went wrong.
        reason: String,
    },
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The layered configuration could not be extracted.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Provides default suggestions for common contract error codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "CONTRACT-004-CYCLE" => Some(
                "Check your stage dependencies for circular references. \
                 Use a linear chain or fan-out pattern instead.",
            ),
            "CONTRACT-004-MISSING_DEP" => Some(
                "Ensure all dependencies reference stages that exist in the pipeline. \
                 Check for typos in stage names.",
            ),
            "CONTRACT-004-DUPLICATE" => Some(
                "Stage names must be unique within a pipeline. Rename one of the stages.",
            ),
            "CONTRACT-004-EMPTY" => Some("Add at least one stage to the pipeline before building."),
            _ => None,
        }
    }
}
