//! Raw file download.

use super::Stage;
use crate::context::{DatasetHandle, RunContext};
use crate::errors::StageError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::info;

/// Downloads a raw dataset file unless a local copy already exists.
///
/// The file is written to a `.part` sibling and renamed into place, so an
/// interrupted download never leaves a truncated file that a rerun would
/// mistake for a complete one.
#[derive(Debug, Clone)]
pub struct DownloadStage {
    name: String,
    dataset: String,
    url: String,
    path: PathBuf,
}

impl DownloadStage {
    /// Creates a download stage producing `dataset` at `path`.
    pub fn new(
        name: impl Into<String>,
        dataset: impl Into<String>,
        url: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            dataset: dataset.into(),
            url: url.into(),
            path: path.into(),
        }
    }

    /// The local file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn partial_path(&self) -> PathBuf {
        let mut file_name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        file_name.push(".part");
        self.path.with_file_name(file_name)
    }
}

#[async_trait]
impl Stage for DownloadStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), StageError> {
        if tokio::fs::try_exists(&self.path).await? {
            info!(dataset = %self.dataset, path = %self.path.display(), "File already exists, skipping download");
            ctx.set_dataset(&self.dataset, DatasetHandle::File(self.path.clone()));
            return Ok(());
        }

        let body = ctx.fetcher().fetch(&self.url).await?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = self.partial_path();
        tokio::fs::write(&partial, &body).await?;
        tokio::fs::rename(&partial, &self.path).await?;

        info!(
            dataset = %self.dataset,
            path = %self.path.display(),
            bytes = body.len(),
            sha256 = %hex::encode(Sha256::digest(&body)),
            "Downloaded dataset"
        );
        ctx.set_dataset(&self.dataset, DatasetHandle::File(self.path.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryStorage;
    use crate::testing::ScriptedFetcher;
    use std::sync::Arc;

    fn context(fetcher: Arc<ScriptedFetcher>) -> RunContext {
        RunContext::new("test", Arc::new(MemoryStorage::new()), fetcher)
    }

    #[tokio::test]
    async fn test_downloads_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw").join("orders.csv");
        let fetcher = Arc::new(ScriptedFetcher::new(b"order_id\n1\n".to_vec()));
        let ctx = context(fetcher.clone());

        let stage = DownloadStage::new("download_orders", "orders", "http://example/orders.csv", &path);
        stage.run(&ctx).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"order_id\n1\n");
        assert!(!stage.partial_path().exists());
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(ctx.require_file("orders").unwrap(), path);
    }

    #[tokio::test]
    async fn test_existing_file_is_not_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.csv");
        std::fs::write(&path, b"local").unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new(b"remote".to_vec()));
        let ctx = context(fetcher.clone());

        let stage = DownloadStage::new("download_orders", "orders", "http://example/orders.csv", &path);
        stage.run(&ctx).await.unwrap();
        stage.run(&ctx).await.unwrap();

        assert_eq!(fetcher.calls(), 0);
        assert_eq!(std::fs::read(&path).unwrap(), b"local");
        assert!(ctx.dataset("orders").is_some());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_transient_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.csv");
        let fetcher = Arc::new(ScriptedFetcher::new(b"x".to_vec()).failing_first(1));
        let ctx = context(fetcher);

        let stage = DownloadStage::new("download_orders", "orders", "http://example/orders.csv", &path);
        let err = stage.run(&ctx).await.unwrap_err();

        assert!(err.is_retryable());
        assert!(!path.exists());
        assert!(ctx.dataset("orders").is_none());
    }
}
