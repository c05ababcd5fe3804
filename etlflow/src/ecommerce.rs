//! The e-commerce orders pipeline.
//!
//! Two raw CSV files (orders and inventory) are downloaded, loaded into the
//! relational store, joined on `product_id`, validated, promoted to
//! `final_data` and summarized as total quantity per product.

use crate::config::PipelineConfig;
use crate::errors::{EtlError, PipelineValidationError};
use crate::events::EventSink;
use crate::io::{Fetcher, SqliteConnector};
use crate::pipeline::{PipelineBuilder, StageGraph};
use crate::runner::Runner;
use crate::stages::{
    DownloadStage, IngestStage, PersistStage, ReportSink, ReportStage, TransformStage, ValidateStage,
};
use crate::validation::RuleSet;
use chrono::Utc;
use std::sync::Arc;

/// Stage names in declaration order.
pub const STAGES: [&str; 7] = [
    "download_orders",
    "download_inventory",
    "ingest",
    "transform",
    "validate",
    "persist",
    "generate_reports",
];

/// Builds the seven-stage pipeline described by `config`.
///
/// # Errors
///
/// Returns an error only if the declarations are inconsistent.
pub fn ecommerce_pipeline(
    config: &PipelineConfig,
    report_sink: Arc<dyn ReportSink>,
) -> Result<StageGraph, PipelineValidationError> {
    let rules = RuleSet::standard(config.validation.required_columns.clone(), Arc::new(Utc::now));

    PipelineBuilder::new(&config.pipeline)
        .with_default_retry(config.retry.policy())
        .stage(
            "download_orders",
            Arc::new(DownloadStage::new(
                "download_orders",
                "orders",
                &config.sources.orders_url,
                config.orders_path(),
            )),
            &[],
        )
        .stage(
            "download_inventory",
            Arc::new(DownloadStage::new(
                "download_inventory",
                "inventory",
                &config.sources.inventory_url,
                config.inventory_path(),
            )),
            &["download_orders"],
        )
        .stage(
            "ingest",
            Arc::new(
                IngestStage::new("ingest")
                    .with_source("orders", "orders")
                    .with_source("inventory", "inventory"),
            ),
            &["download_inventory"],
        )
        .stage(
            "transform",
            Arc::new(TransformStage::new(
                "transform",
                "orders",
                "inventory",
                "product_id",
                "transformed",
                "transformed_data",
            )),
            &["ingest"],
        )
        .stage(
            "validate",
            Arc::new(ValidateStage::new("validate", "transformed", rules)),
            &["transform"],
        )
        .stage(
            "persist",
            Arc::new(PersistStage::new("persist", "transformed", "final", "final_data")),
            &["validate"],
        )
        .stage(
            "generate_reports",
            Arc::new(ReportStage::new("generate_reports", "final", report_sink)),
            &["persist"],
        )
        .build()
}

/// Builds a runner for the pipeline over the configured SQLite database.
///
/// # Errors
///
/// Returns an error if the pipeline declaration is invalid.
pub fn ecommerce_runner(
    config: &PipelineConfig,
    fetcher: Arc<dyn Fetcher>,
    report_sink: Arc<dyn ReportSink>,
    event_sink: Arc<dyn EventSink>,
) -> Result<Runner, EtlError> {
    let graph = ecommerce_pipeline(config, report_sink)?;
    Ok(Runner::new(
        graph,
        Arc::new(SqliteConnector::new(&config.storage.sqlite_path)),
        fetcher,
    )
    .with_event_sink(event_sink)
    .with_overlap_policy(config.schedule.overlap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::LogReportSink;

    #[test]
    fn test_declares_linear_chain() {
        let graph = ecommerce_pipeline(&PipelineConfig::default(), Arc::new(LogReportSink)).unwrap();

        assert_eq!(graph.name(), "ecommerce_data_pipeline");
        assert_eq!(graph.execution_order(), &STAGES);
        for pair in STAGES.windows(2) {
            let def = graph.definition(pair[1]).unwrap();
            assert!(def.dependencies.contains(pair[0]));
        }
    }

    #[test]
    fn test_stages_use_configured_retry() {
        let mut config = PipelineConfig::default();
        config.retry.retries = 3;
        let graph = ecommerce_pipeline(&config, Arc::new(LogReportSink)).unwrap();

        assert!(STAGES
            .iter()
            .all(|s| graph.definition(s).is_some_and(|d| d.retry.max_attempts == 4)));
    }
}
