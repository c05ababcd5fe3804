//! The validation gate stage.

use super::Stage;
use crate::context::RunContext;
use crate::errors::StageError;
use crate::validation::RuleSet;
use async_trait::async_trait;
use tracing::{info, warn};

/// Runs a [`RuleSet`] against a stored dataset.
///
/// A failed rule surfaces as [`StageError::Validation`], which is never
/// retried and halts the run before persistence.
#[derive(Debug)]
pub struct ValidateStage {
    name: String,
    dataset: String,
    rules: RuleSet,
}

impl ValidateStage {
    /// Creates a validation stage.
    pub fn new(name: impl Into<String>, dataset: impl Into<String>, rules: RuleSet) -> Self {
        Self {
            name: name.into(),
            dataset: dataset.into(),
            rules,
        }
    }
}

#[async_trait]
impl Stage for ValidateStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), StageError> {
        let table = ctx.require_table(&self.dataset)?;
        let data = ctx.storage().read_table(&table)?;

        let outcome = self.rules.validate(&data);
        if outcome.passed {
            info!(dataset = %self.dataset, rows = data.len(), "Data validation passed");
        } else {
            warn!(
                dataset = %self.dataset,
                rule = outcome.failed_rule.as_deref().unwrap_or_default(),
                message = outcome.message.as_deref().unwrap_or_default(),
                "Data validation failed"
            );
        }
        outcome.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DatasetHandle;
    use crate::core::{Dataset, Value};
    use crate::io::Storage;
    use crate::testing::memory_context;
    use crate::validation::NO_MISSING_VALUES;

    #[tokio::test]
    async fn test_validation_failure_carries_rule() {
        let (storage, ctx) = memory_context();
        let bad = Dataset::from_rows(
            "transformed_data",
            ["order_id", "product_id", "quantity", "order_date"],
            vec![vec![1.into(), "p1".into(), Value::Null, "2023-01-01".into()]],
        )
        .unwrap();
        storage.write_table("transformed_data", &bad).unwrap();
        ctx.set_dataset("transformed", DatasetHandle::Table("transformed_data".into()));

        let stage = ValidateStage::new("validate", "transformed", RuleSet::standard_now());
        let err = stage.run(&ctx).await.unwrap_err();

        assert!(matches!(err, StageError::Validation { ref rule, .. } if rule == NO_MISSING_VALUES));
    }

    #[tokio::test]
    async fn test_clean_data_passes() {
        let (storage, ctx) = memory_context();
        let good = Dataset::from_rows(
            "transformed_data",
            ["order_id", "product_id", "quantity", "order_date"],
            vec![vec![1.into(), "p1".into(), 2.into(), "2023-01-01".into()]],
        )
        .unwrap();
        storage.write_table("transformed_data", &good).unwrap();
        ctx.set_dataset("transformed", DatasetHandle::Table("transformed_data".into()));

        let stage = ValidateStage::new("validate", "transformed", RuleSet::standard_now());
        assert!(stage.run(&ctx).await.is_ok());
    }
}
