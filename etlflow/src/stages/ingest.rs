//! Raw file ingestion into storage.

use super::Stage;
use crate::context::{DatasetHandle, RunContext};
use crate::errors::StageError;
use crate::io::csv::read_csv_file;
use async_trait::async_trait;
use tracing::info;

/// Loads raw CSV datasets into storage tables, replacing each table.
#[derive(Debug, Clone)]
pub struct IngestStage {
    name: String,
    sources: Vec<(String, String)>,
}

impl IngestStage {
    /// Creates an ingest stage with no sources.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
        }
    }

    /// Loads the raw file of `dataset` into `table`.
    #[must_use]
    pub fn with_source(mut self, dataset: impl Into<String>, table: impl Into<String>) -> Self {
        self.sources.push((dataset.into(), table.into()));
        self
    }
}

#[async_trait]
impl Stage for IngestStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), StageError> {
        // Parse everything first so a malformed file leaves all tables untouched.
        let mut loaded = Vec::with_capacity(self.sources.len());
        for (dataset, table) in &self.sources {
            let path = ctx.require_file(dataset)?;
            loaded.push((dataset, table, read_csv_file(&path, dataset)?));
        }

        for (dataset, table, data) in loaded {
            ctx.storage().write_table(table, &data)?;
            ctx.set_dataset(dataset.as_str(), DatasetHandle::Table(table.clone()));
            info!(dataset = %dataset, table = %table, rows = data.len(), "Ingested dataset");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemoryStorage, Storage};
    use crate::testing::ScriptedFetcher;
    use std::path::Path;
    use std::sync::Arc;

    fn context_with_files(storage: &MemoryStorage, orders: &Path, inventory: &Path) -> RunContext {
        let ctx = RunContext::new(
            "test",
            Arc::new(storage.clone()),
            Arc::new(ScriptedFetcher::new(Vec::new())),
        );
        ctx.set_dataset("orders", DatasetHandle::File(orders.to_path_buf()));
        ctx.set_dataset("inventory", DatasetHandle::File(inventory.to_path_buf()));
        ctx
    }

    fn stage() -> IngestStage {
        IngestStage::new("ingest")
            .with_source("orders", "orders")
            .with_source("inventory", "inventory")
    }

    #[tokio::test]
    async fn test_ingest_twice_yields_same_row_set() {
        let dir = tempfile::tempdir().unwrap();
        let orders = dir.path().join("orders.csv");
        let inventory = dir.path().join("inventory.csv");
        std::fs::write(&orders, "order_id,product_id,quantity\n1,p1,2\n2,p2,1\n").unwrap();
        std::fs::write(&inventory, "product_id,name\np1,Widget\np2,Gadget\n").unwrap();

        let storage = MemoryStorage::new();
        let ctx = context_with_files(&storage, &orders, &inventory);

        stage().run(&ctx).await.unwrap();
        let once = storage.read_table("orders").unwrap();

        let ctx = context_with_files(&storage, &orders, &inventory);
        stage().run(&ctx).await.unwrap();
        let twice = storage.read_table("orders").unwrap();

        assert_eq!(twice.len(), 2);
        assert_eq!(once.fingerprint(), twice.fingerprint());
        assert_eq!(ctx.require_table("inventory").unwrap(), "inventory");
    }

    #[tokio::test]
    async fn test_malformed_file_is_fatal_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let orders = dir.path().join("orders.csv");
        let inventory = dir.path().join("inventory.csv");
        std::fs::write(&orders, "order_id,product_id\n1,p1\n").unwrap();
        std::fs::write(&inventory, "product_id,name\np1\n").unwrap();

        let storage = MemoryStorage::new();
        let ctx = context_with_files(&storage, &orders, &inventory);

        let err = stage().run(&ctx).await.unwrap_err();
        assert!(!err.is_retryable());
        assert!(storage.table_names().is_empty());
    }

    #[tokio::test]
    async fn test_missing_upstream_file_handle() {
        let ctx = crate::testing::test_context();
        assert_eq!(
            stage().run(&ctx).await,
            Err(StageError::missing_dataset("orders"))
        );
    }
}
