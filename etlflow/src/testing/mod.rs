//! Testing utilities for etlflow pipelines.
//!
//! This module provides:
//! - Scripted collaborators (fetcher, stages, report sink)
//! - Sample datasets and run contexts backed by in-memory storage

mod fixtures;
mod mocks;

pub use fixtures::{
    memory_context, sample_inventory, sample_orders, test_context, INVENTORY_CSV, ORDERS_CSV,
};
pub use mocks::{CollectingReportSink, ScriptedFetcher, ScriptedStage};
