//! Core domain model types for etlflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Typed tabular datasets
//! - Stage status and failure classification
//! - Immutable stage results

mod dataset;
mod result;
mod status;

pub use dataset::{Dataset, Value};
pub use result::{StageFailure, StageResult};
pub use status::{FailureKind, StageStatus};
