//! # Etlflow
//!
//! A batch ETL engine that runs a declared graph of stages against a
//! relational store.
//!
//! Etlflow provides:
//!
//! - **Dependency ordering**: stages run in topological order over their declared dependencies
//! - **Bounded retries**: each stage is retried on transient failures with a fixed delay
//! - **Idempotent stages**: every output is a full replacement, so reruns are safe
//! - **Validation gate**: a failed rule halts the run before anything is persisted
//! - **No-overlap scheduling**: interval triggers without catch-up, one run at a time
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use etlflow::prelude::*;
//!
//! let config = load_config(None)?;
//! let runner = ecommerce_runner(
//!     &config,
//!     Arc::new(HttpFetcher::new(Duration::from_secs(60))?),
//!     Arc::new(LogReportSink),
//!     Arc::new(LoggingEventSink::default()),
//! )?;
//!
//! if let TriggerOutcome::Completed(run) = runner.trigger_run().await? {
//!     println!("{}", run.outcome);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod ecommerce;
pub mod errors;
pub mod events;
pub mod io;
pub mod observability;
pub mod pipeline;
pub mod runner;
pub mod stages;
pub mod utils;
pub mod validation;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{load_config, PipelineConfig};
    pub use crate::context::{DatasetHandle, RunContext};
    pub use crate::core::{Dataset, FailureKind, StageFailure, StageResult, StageStatus, Value};
    pub use crate::ecommerce::{ecommerce_pipeline, ecommerce_runner};
    pub use crate::errors::{EtlError, PipelineValidationError, StageError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    #[cfg(feature = "http")]
    pub use crate::io::HttpFetcher;
    pub use crate::io::{Fetcher, MemoryStorage, SqliteConnector, Storage, StorageConnector};
    pub use crate::pipeline::{
        PipelineBuilder, PipelineRun, RetryPolicy, RunOutcome, StageDefinition, StageGraph,
    };
    pub use crate::runner::{OverlapPolicy, Runner, Scheduler, TriggerOutcome};
    pub use crate::stages::{LogReportSink, ReportSink, Stage};
    pub use crate::utils::{iso_timestamp, Timestamp};
    pub use crate::validation::{RuleSet, ValidationOutcome, ValidationRule};
}
