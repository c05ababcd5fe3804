//! Promotion of a validated dataset to its final table.

use super::Stage;
use crate::context::{DatasetHandle, RunContext};
use crate::errors::StageError;
use async_trait::async_trait;
use tracing::info;

/// Copies a stored dataset into the final table, replacing it.
#[derive(Debug, Clone)]
pub struct PersistStage {
    name: String,
    source: String,
    target: String,
    table: String,
}

impl PersistStage {
    /// Creates a persist stage copying dataset `source` into `target`, stored as `table`.
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            target: target.into(),
            table: table.into(),
        }
    }
}

#[async_trait]
impl Stage for PersistStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), StageError> {
        let data = ctx.storage().read_table(&ctx.require_table(&self.source)?)?;
        ctx.storage().write_table(&self.table, &data)?;
        ctx.set_dataset(self.target.as_str(), DatasetHandle::Table(self.table.clone()));

        info!(table = %self.table, rows = data.len(), "Final data persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Storage;
    use crate::testing::{memory_context, sample_orders};

    #[tokio::test]
    async fn test_persist_copies_rows() {
        let (storage, ctx) = memory_context();
        storage.write_table("transformed_data", &sample_orders()).unwrap();
        ctx.set_dataset("transformed", DatasetHandle::Table("transformed_data".into()));

        let stage = PersistStage::new("persist", "transformed", "final", "final_data");
        stage.run(&ctx).await.unwrap();
        stage.run(&ctx).await.unwrap();

        let stored = storage.read_table("final_data").unwrap();
        assert_eq!(stored.len(), sample_orders().len());
        assert_eq!(ctx.require_table("final").unwrap(), "final_data");
    }
}
