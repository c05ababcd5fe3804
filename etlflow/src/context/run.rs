//! The context shared by the stages of a single pipeline run.

use crate::cancellation::CancellationToken;
use crate::core::StageResult;
use crate::events::{EventSink, NoOpEventSink};
use crate::io::{Fetcher, Storage};
use crate::errors::StageError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Where the current version of a dataset lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetHandle {
    /// A raw file on local disk.
    File(PathBuf),
    /// A table in the run's storage session.
    Table(String),
}

/// State owned by one pipeline run.
///
/// Stages see the storage session, the fetcher and the datasets produced by
/// earlier stages. The stage result log is appended only by the graph, in
/// dependency order. Dropping the context releases the storage session.
pub struct RunContext {
    run_id: Uuid,
    pipeline: String,
    storage: Arc<dyn Storage>,
    fetcher: Arc<dyn Fetcher>,
    datasets: RwLock<HashMap<String, DatasetHandle>>,
    results: RwLock<Vec<StageResult>>,
    cancel: Arc<CancellationToken>,
    event_sink: Arc<dyn EventSink>,
}

impl RunContext {
    /// Creates a context for a new run.
    #[must_use]
    pub fn new(pipeline: impl Into<String>, storage: Arc<dyn Storage>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            storage,
            fetcher,
            datasets: RwLock::new(HashMap::new()),
            results: RwLock::new(Vec::new()),
            cancel: Arc::new(CancellationToken::new()),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// The run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// The storage session for this run.
    #[must_use]
    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// The remote fetcher.
    #[must_use]
    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    /// The event sink.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }

    /// Emits an event tagged with the run id.
    pub fn emit(&self, event_type: &str, mut data: serde_json::Value) {
        if let Some(obj) = data.as_object_mut() {
            obj.insert("run_id".to_string(), serde_json::json!(self.run_id.to_string()));
            obj.insert("pipeline".to_string(), serde_json::json!(self.pipeline));
        }
        self.event_sink.emit(event_type, Some(data));
    }

    /// Records where a dataset now lives, replacing any previous handle.
    pub fn set_dataset(&self, name: impl Into<String>, handle: DatasetHandle) {
        self.datasets.write().insert(name.into(), handle);
    }

    /// Looks up a dataset handle.
    #[must_use]
    pub fn dataset(&self, name: &str) -> Option<DatasetHandle> {
        self.datasets.read().get(name).cloned()
    }

    /// Looks up a dataset that must have been produced earlier in the run.
    pub fn require_dataset(&self, name: &str) -> Result<DatasetHandle, StageError> {
        self.dataset(name).ok_or_else(|| StageError::missing_dataset(name))
    }

    /// Resolves a dataset that must live in storage to its table name.
    pub fn require_table(&self, name: &str) -> Result<String, StageError> {
        match self.require_dataset(name)? {
            DatasetHandle::Table(table) => Ok(table),
            DatasetHandle::File(path) => Err(StageError::fatal(format!(
                "Dataset '{name}' is a raw file ({}), not a table",
                path.display()
            ))),
        }
    }

    /// Resolves a dataset that must be a local file to its path.
    pub fn require_file(&self, name: &str) -> Result<PathBuf, StageError> {
        match self.require_dataset(name)? {
            DatasetHandle::File(path) => Ok(path),
            DatasetHandle::Table(table) => Err(StageError::fatal(format!(
                "Dataset '{name}' is table '{table}', not a raw file"
            ))),
        }
    }

    pub(crate) fn record_result(&self, result: StageResult) {
        self.results.write().push(result);
    }

    /// Stage results recorded so far, in execution order.
    #[must_use]
    pub fn results(&self) -> Vec<StageResult> {
        self.results.read().clone()
    }

    /// Returns true if `stage` has a successful result in this run.
    #[must_use]
    pub fn has_succeeded(&self, stage: &str) -> bool {
        self.results
            .read()
            .iter()
            .any(|r| r.stage_name() == stage && r.is_success())
    }

    /// The run's cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Returns true if the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("pipeline", &self.pipeline)
            .field("datasets", &*self.datasets.read())
            .field("results", &self.results.read().len())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::io::MemoryStorage;
    use crate::testing::ScriptedFetcher;
    use chrono::Utc;

    fn context() -> RunContext {
        RunContext::new(
            "test",
            Arc::new(MemoryStorage::new()),
            Arc::new(ScriptedFetcher::new(b"a\n1\n".to_vec())),
        )
    }

    #[test]
    fn test_dataset_handles_replace() {
        let ctx = context();
        ctx.set_dataset("orders", DatasetHandle::File(PathBuf::from("/tmp/orders.csv")));
        assert_eq!(ctx.require_file("orders").unwrap(), PathBuf::from("/tmp/orders.csv"));
        assert!(ctx.require_table("orders").is_err());

        ctx.set_dataset("orders", DatasetHandle::Table("orders".into()));
        assert_eq!(ctx.require_table("orders").unwrap(), "orders");
    }

    #[test]
    fn test_missing_dataset() {
        let ctx = context();
        assert_eq!(
            ctx.require_dataset("final"),
            Err(StageError::missing_dataset("final"))
        );
    }

    #[test]
    fn test_results_and_success_lookup() {
        let ctx = context();
        let now = Utc::now();
        ctx.record_result(StageResult::success("download_orders", 1, now, now));

        assert!(ctx.has_succeeded("download_orders"));
        assert!(!ctx.has_succeeded("ingest"));
        assert_eq!(ctx.results().len(), 1);
    }

    #[test]
    fn test_emit_tags_run_id() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = context().with_event_sink(sink.clone());
        ctx.emit("stage.started", serde_json::json!({"stage": "ingest"}));

        let events = sink.events();
        let data = events[0].1.as_ref().unwrap();
        assert_eq!(data["run_id"], ctx.run_id().to_string());
        assert_eq!(data["stage"], "ingest");
    }
}
