//! Run triggering with overlap control, and the interval scheduler.
//!
//! A [`Runner`] owns one pipeline graph and starts runs on demand. At most one
//! run of the pipeline is in flight at a time; a trigger that arrives while a
//! run is active is skipped or queued according to its [`OverlapPolicy`].

mod scheduler;

pub use scheduler::{next_fire_after, Scheduler, SchedulerStats};

use crate::cancellation::CancellationToken;
use crate::context::RunContext;
use crate::errors::EtlError;
use crate::events::{EventSink, NoOpEventSink, RUN_SKIPPED};
use crate::io::{Fetcher, StorageConnector};
use crate::pipeline::{PipelineRun, RunOutcome, StageGraph};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What to do with a trigger that arrives while a run is in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Drop the trigger with a warning.
    #[default]
    Skip,
    /// Wait for the active run to finish, then run.
    Queue,
}

impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Queue => write!(f, "queue"),
        }
    }
}

/// Result of one trigger.
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    /// A run executed to a terminal state.
    Completed(PipelineRun),
    /// Another run was in progress and the policy is [`OverlapPolicy::Skip`].
    Skipped,
}

impl TriggerOutcome {
    /// The run, if one executed.
    #[must_use]
    pub fn run(&self) -> Option<&PipelineRun> {
        match self {
            Self::Completed(run) => Some(run),
            Self::Skipped => None,
        }
    }

    /// Returns true if the trigger was dropped.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// Starts pipeline runs, never more than one at a time.
pub struct Runner {
    graph: Arc<StageGraph>,
    connector: Arc<dyn StorageConnector>,
    fetcher: Arc<dyn Fetcher>,
    event_sink: Arc<dyn EventSink>,
    overlap: OverlapPolicy,
    run_lock: tokio::sync::Mutex<()>,
    active: Mutex<Option<Arc<CancellationToken>>>,
    closed: CancellationToken,
}

impl Runner {
    /// Creates a runner with the skip overlap policy.
    #[must_use]
    pub fn new(graph: StageGraph, connector: Arc<dyn StorageConnector>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            graph: Arc::new(graph),
            connector,
            fetcher,
            event_sink: Arc::new(NoOpEventSink),
            overlap: OverlapPolicy::default(),
            run_lock: tokio::sync::Mutex::new(()),
            active: Mutex::new(None),
            closed: CancellationToken::new(),
        }
    }

    /// Sets the event sink handed to every run.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Sets the overlap policy.
    #[must_use]
    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap = policy;
        self
    }

    /// The pipeline graph.
    #[must_use]
    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    /// The overlap policy.
    #[must_use]
    pub fn overlap_policy(&self) -> OverlapPolicy {
        self.overlap
    }

    /// Returns true while a run holds the pipeline.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Returns true once [`Runner::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Starts a run now, subject to the overlap policy.
    ///
    /// A storage session is acquired for the run and released when it ends.
    /// Once the runner is closed, triggers (including those already queued)
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage session cannot be opened. Stage failures
    /// are not errors; they are reported in the returned run.
    pub async fn trigger_run(&self) -> Result<TriggerOutcome, EtlError> {
        if self.is_closed() {
            return Ok(self.skip("runner closed"));
        }

        let _guard = match self.overlap {
            OverlapPolicy::Skip => {
                let Ok(guard) = self.run_lock.try_lock() else {
                    return Ok(self.skip("run in progress"));
                };
                guard
            }
            OverlapPolicy::Queue => {
                if self.is_running() {
                    info!(pipeline = %self.graph.name(), "Run in progress, queueing trigger");
                }
                let guard = self.run_lock.lock().await;
                if self.is_closed() {
                    return Ok(self.skip("runner closed"));
                }
                guard
            }
        };

        let storage = self.connector.connect()?;
        let token = Arc::new(CancellationToken::new());
        *self.active.lock() = Some(token.clone());
        if self.is_closed() {
            token.cancel(self.closed.reason().unwrap_or_else(|| "runner closed".to_string()));
        }

        let ctx = RunContext::new(self.graph.name(), storage, self.fetcher.clone())
            .with_event_sink(self.event_sink.clone())
            .with_cancellation(token);
        let run = self.graph.execute(&ctx).await;
        drop(ctx);
        *self.active.lock() = None;

        log_outcome(&run);
        Ok(TriggerOutcome::Completed(run))
    }

    /// Stops accepting runs and cancels the in-flight one.
    ///
    /// Queued triggers are dropped when they reach the front of the queue.
    pub fn close(&self, reason: &str) {
        self.closed.cancel(reason);
        self.cancel_active(reason);
    }

    fn skip(&self, reason: &str) -> TriggerOutcome {
        warn!(pipeline = %self.graph.name(), reason, "Skipping trigger");
        self.event_sink.emit(
            RUN_SKIPPED,
            Some(serde_json::json!({
                "pipeline": self.graph.name(),
                "reason": reason,
            })),
        );
        TriggerOutcome::Skipped
    }

    /// Cancels the in-flight run before its next stage. Returns false if idle.
    pub fn cancel_active(&self, reason: &str) -> bool {
        match self.active.lock().as_ref() {
            Some(token) => {
                token.cancel(reason);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("pipeline", &self.graph.name())
            .field("overlap", &self.overlap)
            .field("running", &self.is_running())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn log_outcome(run: &PipelineRun) {
    match &run.outcome {
        RunOutcome::Success => info!(
            pipeline = %run.pipeline,
            run_id = %run.run_id,
            stages = run.results.len(),
            duration_ms = run.duration_ms(),
            "Run finished: success"
        ),
        RunOutcome::Failed { stage, error, skipped } => error!(
            pipeline = %run.pipeline,
            run_id = %run.run_id,
            failed_stage = %stage,
            error = %error,
            skipped_stages = %skipped.join(", "),
            "Run finished: failed"
        ),
        RunOutcome::Cancelled { reason, skipped } => warn!(
            pipeline = %run.pipeline,
            run_id = %run.run_id,
            reason = %reason,
            skipped_stages = %skipped.join(", "),
            "Run finished: cancelled"
        ),
    }
}
