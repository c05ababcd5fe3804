//! Merge of two stored datasets.

use super::Stage;
use crate::context::{DatasetHandle, RunContext};
use crate::errors::StageError;
use async_trait::async_trait;
use tracing::info;

/// Inner-joins two stored datasets on a key column and replaces the output table.
#[derive(Debug, Clone)]
pub struct TransformStage {
    name: String,
    left: String,
    right: String,
    key: String,
    output: String,
    table: String,
}

impl TransformStage {
    /// Creates a transform joining `left` and `right` on `key` into `output`,
    /// stored as `table`.
    pub fn new(
        name: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
        key: impl Into<String>,
        output: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            left: left.into(),
            right: right.into(),
            key: key.into(),
            output: output.into(),
            table: table.into(),
        }
    }
}

#[async_trait]
impl Stage for TransformStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), StageError> {
        let left = ctx.storage().read_table(&ctx.require_table(&self.left)?)?;
        let right = ctx.storage().read_table(&ctx.require_table(&self.right)?)?;

        let merged = left.inner_join(&right, &self.key, self.output.as_str())?;
        ctx.storage().write_table(&self.table, &merged)?;
        ctx.set_dataset(self.output.as_str(), DatasetHandle::Table(self.table.clone()));

        info!(
            left_rows = left.len(),
            right_rows = right.len(),
            merged_rows = merged.len(),
            table = %self.table,
            "Data transformed and merged"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Dataset;
    use crate::io::Storage;
    use crate::testing::{memory_context, sample_inventory, sample_orders};

    #[tokio::test]
    async fn test_transform_replaces_output() {
        let (storage, ctx) = memory_context();
        storage.write_table("orders", &sample_orders()).unwrap();
        storage.write_table("inventory", &sample_inventory()).unwrap();
        ctx.set_dataset("orders", DatasetHandle::Table("orders".into()));
        ctx.set_dataset("inventory", DatasetHandle::Table("inventory".into()));

        let stage = TransformStage::new(
            "transform", "orders", "inventory", "product_id", "transformed", "transformed_data",
        );
        stage.run(&ctx).await.unwrap();
        stage.run(&ctx).await.unwrap();

        let expected = sample_orders()
            .inner_join(&sample_inventory(), "product_id", "transformed_data")
            .unwrap();
        let stored: Dataset = storage.read_table("transformed_data").unwrap();
        assert_eq!(stored.len(), expected.len());
        assert_eq!(stored.fingerprint(), expected.fingerprint());
        assert_eq!(ctx.require_table("transformed").unwrap(), "transformed_data");
    }

    #[tokio::test]
    async fn test_missing_key_column_is_fatal() {
        let (storage, ctx) = memory_context();
        let no_key = Dataset::from_rows("orders", ["order_id"], vec![vec![1.into()]]).unwrap();
        storage.write_table("orders", &no_key).unwrap();
        storage.write_table("inventory", &sample_inventory()).unwrap();
        ctx.set_dataset("orders", DatasetHandle::Table("orders".into()));
        ctx.set_dataset("inventory", DatasetHandle::Table("inventory".into()));

        let stage = TransformStage::new(
            "transform", "orders", "inventory", "product_id", "transformed", "transformed_data",
        );
        let err = stage.run(&ctx).await.unwrap_err();
        assert!(matches!(err, StageError::Fatal(_)));
    }
}
