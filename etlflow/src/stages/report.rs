//! Aggregate reporting over the final dataset.

use super::Stage;
use crate::context::RunContext;
use crate::core::{Dataset, Value};
use crate::errors::StageError;
use async_trait::async_trait;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Total quantity for one product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductTotal {
    /// The product id as displayed.
    pub product_id: String,
    /// Sum of non-null quantities.
    pub total_quantity: f64,
}

/// Total quantity per product, ordered by product id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuantityReport {
    /// Per-product totals.
    pub totals: Vec<ProductTotal>,
}

impl QuantityReport {
    /// Looks up the total for a product.
    #[must_use]
    pub fn total_for(&self, product_id: &str) -> Option<f64> {
        self.totals
            .iter()
            .find(|t| t.product_id == product_id)
            .map(|t| t.total_quantity)
    }
}

impl fmt::Display for QuantityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .totals
            .iter()
            .map(|t| t.product_id.len())
            .max()
            .unwrap_or(0)
            .max("product_id".len());
        writeln!(f, "{:<width$}  quantity", "product_id")?;
        for total in &self.totals {
            writeln!(f, "{:<width$}  {}", total.product_id, total.total_quantity)?;
        }
        Ok(())
    }
}

/// Groups `dataset` by `product_id` and sums `quantity`.
///
/// Rows with a null product id are dropped and null quantities count as zero.
/// A quantity that is not numeric is an error.
pub fn summarize_quantities(dataset: &Dataset) -> Result<QuantityReport, StageError> {
    let product_idx = dataset.column_index("product_id");
    let quantity_idx = dataset.column_index("quantity");
    let (Some(product_idx), Some(quantity_idx)) = (product_idx, quantity_idx) else {
        return Err(StageError::fatal(format!(
            "Dataset '{}' needs product_id and quantity columns",
            dataset.name()
        )));
    };

    let mut groups: HashMap<String, (Value, f64)> = HashMap::new();
    for row in dataset.rows() {
        let product = &row[product_idx];
        if product.is_null() {
            continue;
        }
        let quantity = match &row[quantity_idx] {
            Value::Null => 0.0,
            other => other.as_f64().ok_or_else(|| {
                StageError::fatal(format!("Non-numeric quantity '{other}' for product '{product}'"))
            })?,
        };
        groups
            .entry(product.key_repr())
            .or_insert_with(|| (product.clone(), 0.0))
            .1 += quantity;
    }

    let mut entries: Vec<(Value, f64)> = groups.into_values().collect();
    entries.sort_by(|(a, _), (b, _)| compare_keys(a, b));

    Ok(QuantityReport {
        totals: entries
            .into_iter()
            .map(|(product, total_quantity)| ProductTotal {
                product_id: product.to_string(),
                total_quantity,
            })
            .collect(),
    })
}

fn compare_keys(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(x, y)| x.partial_cmp(&y))
            .unwrap_or(Ordering::Equal),
        (Value::Int(_) | Value::Float(_), _) => Ordering::Less,
        (_, Value::Int(_) | Value::Float(_)) => Ordering::Greater,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Destination for generated reports.
pub trait ReportSink: Send + Sync + fmt::Debug {
    /// Publishes a report.
    fn publish(&self, pipeline: &str, report: &QuantityReport) -> Result<(), StageError>;
}

/// Writes reports to the log and prints them to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReportSink;

impl ReportSink for LogReportSink {
    fn publish(&self, pipeline: &str, report: &QuantityReport) -> Result<(), StageError> {
        info!(
            pipeline = pipeline,
            products = report.totals.len(),
            "Report generated: Total sales per product"
        );
        println!("{report}");
        Ok(())
    }
}

/// Summarizes a stored dataset and hands the report to a [`ReportSink`].
#[derive(Debug)]
pub struct ReportStage {
    name: String,
    dataset: String,
    sink: Arc<dyn ReportSink>,
}

impl ReportStage {
    /// Creates a report stage over `dataset`.
    pub fn new(name: impl Into<String>, dataset: impl Into<String>, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            name: name.into(),
            dataset: dataset.into(),
            sink,
        }
    }
}

#[async_trait]
impl Stage for ReportStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), StageError> {
        let data = ctx.storage().read_table(&ctx.require_table(&self.dataset)?)?;
        let report = summarize_quantities(&data)?;
        self.sink.publish(ctx.pipeline(), &report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DatasetHandle;
    use crate::io::Storage;
    use crate::testing::{memory_context, CollectingReportSink};
    use pretty_assertions::assert_eq;

    fn final_data() -> Dataset {
        Dataset::from_rows(
            "final_data",
            ["order_id", "product_id", "quantity"],
            vec![
                vec![1.into(), 20.into(), 2.into()],
                vec![2.into(), 3.into(), 1.5.into()],
                vec![3.into(), 20.into(), 4.into()],
                vec![4.into(), Value::Null, 9.into()],
                vec![5.into(), 3.into(), Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_summarize_groups_and_sorts() {
        let report = summarize_quantities(&final_data()).unwrap();
        assert_eq!(
            report.totals,
            vec![
                ProductTotal { product_id: "3".into(), total_quantity: 1.5 },
                ProductTotal { product_id: "20".into(), total_quantity: 6.0 },
            ]
        );
    }

    #[test]
    fn test_summarize_rejects_text_quantity() {
        let ds = Dataset::from_rows(
            "final_data",
            ["product_id", "quantity"],
            vec![vec!["p1".into(), "lots".into()]],
        )
        .unwrap();
        assert!(matches!(summarize_quantities(&ds), Err(StageError::Fatal(_))));
    }

    #[test]
    fn test_report_display() {
        let report = summarize_quantities(&final_data()).unwrap();
        let text = report.to_string();
        assert!(text.starts_with("product_id  quantity"));
        assert!(text.contains("20          6"));
    }

    #[tokio::test]
    async fn test_report_stage_publishes() {
        let (storage, ctx) = memory_context();
        storage.write_table("final_data", &final_data()).unwrap();
        ctx.set_dataset("final", DatasetHandle::Table("final_data".into()));

        let sink = Arc::new(CollectingReportSink::new());
        let stage = ReportStage::new("generate_reports", "final", sink.clone());
        stage.run(&ctx).await.unwrap();

        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].total_for("20"), Some(6.0));
    }
}
