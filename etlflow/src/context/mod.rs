//! Per-run execution state.

mod run;

pub use run::{DatasetHandle, RunContext};
