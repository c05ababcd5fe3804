//! StageGraph execution engine.
//!
//! Runs stages one at a time in topological order, wrapping each in its retry
//! policy, and halts at the first stage whose final result is a failure.

use super::{with_retry, PipelineRun, RunOutcome, StageDefinition};
use crate::context::RunContext;
use crate::core::{FailureKind, StageFailure, StageResult};
use crate::errors::StageError;
use crate::events::{
    PIPELINE_CANCELLED, PIPELINE_COMPLETED, PIPELINE_FAILED, PIPELINE_STARTED, STAGE_COMPLETED,
    STAGE_FAILED, STAGE_RETRYING, STAGE_STARTED,
};
use crate::observability::{pipeline_span, stage_span};
use chrono::Utc;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use tracing::{error, info, warn, Instrument};

/// A validated, acyclic graph of stages.
#[derive(Debug, Clone)]
pub struct StageGraph {
    name: String,
    stages: HashMap<String, StageDefinition>,
    execution_order: Vec<String>,
}

impl StageGraph {
    /// Creates a graph from validated definitions; `stage_order` is declaration order.
    pub(crate) fn new(name: String, stages: HashMap<String, StageDefinition>, stage_order: Vec<String>) -> Self {
        let execution_order = topological_sort(&stages, &stage_order);
        Self {
            name,
            stages,
            execution_order,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the execution order.
    #[must_use]
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Looks up a stage definition.
    #[must_use]
    pub fn definition(&self, stage: &str) -> Option<&StageDefinition> {
        self.stages.get(stage)
    }

    /// Executes every stage in order against `ctx`.
    ///
    /// Stage results are appended to the context as they are produced. A
    /// failed final result or a cancellation observed before a stage starts
    /// ends the run; the remaining stages are reported as skipped.
    pub async fn execute(&self, ctx: &RunContext) -> PipelineRun {
        self.execute_inner(ctx)
            .instrument(pipeline_span(&self.name, ctx.run_id()))
            .await
    }

    async fn execute_inner(&self, ctx: &RunContext) -> PipelineRun {
        let started_at = Utc::now();
        info!(
            pipeline = %self.name,
            run_id = %ctx.run_id(),
            stages = self.execution_order.len(),
            "Pipeline run started"
        );
        ctx.emit(PIPELINE_STARTED, json!({ "stages": self.execution_order }));

        let mut outcome = RunOutcome::Success;
        for (idx, name) in self.execution_order.iter().enumerate() {
            let remaining = || self.execution_order[idx..].to_vec();

            if ctx.is_cancelled() {
                let reason = ctx.cancellation().reason().unwrap_or_else(|| "cancelled".to_string());
                outcome = RunOutcome::Cancelled {
                    reason,
                    skipped: remaining(),
                };
                break;
            }

            let Some(def) = self.stages.get(name) else {
                continue;
            };
            let result = self.run_stage(def, ctx).instrument(stage_span(name)).await;
            ctx.record_result(result.clone());

            if let Some(failure) = result.error() {
                let skipped = self.execution_order[idx + 1..].to_vec();
                outcome = if failure.kind == FailureKind::Cancelled {
                    RunOutcome::Cancelled {
                        reason: failure.message.clone(),
                        skipped,
                    }
                } else {
                    RunOutcome::Failed {
                        stage: name.clone(),
                        error: failure.clone(),
                        skipped,
                    }
                };
                break;
            }
        }

        let run = PipelineRun {
            run_id: ctx.run_id(),
            pipeline: self.name.clone(),
            started_at,
            finished_at: Utc::now(),
            results: ctx.results(),
            outcome,
        };
        self.report(ctx, &run);
        run
    }

    async fn run_stage(&self, def: &StageDefinition, ctx: &RunContext) -> StageResult {
        let started_at = Utc::now();

        if let Some(dep) = def.dependencies.iter().find(|d| !ctx.has_succeeded(d)) {
            let err = StageError::DependencyNotSatisfied {
                stage: def.name.clone(),
                dependency: dep.clone(),
            };
            error!(stage = %def.name, dependency = %dep, "Stage scheduled before its dependency succeeded");
            ctx.emit(STAGE_FAILED, json!({ "stage": def.name, "attempts": 0, "error": err.to_string() }));
            return StageResult::failed(&def.name, 0, StageFailure::from(&err), started_at, Utc::now());
        }

        ctx.emit(STAGE_STARTED, json!({ "stage": def.name }));
        let policy = def.effective_retry();
        let attempted = with_retry(
            &policy,
            &def.name,
            ctx.cancellation(),
            StageError::is_retryable,
            |attempt| {
                if attempt > 1 {
                    ctx.emit(STAGE_RETRYING, json!({ "stage": def.name, "attempt": attempt }));
                }
                def.runner.run(ctx)
            },
        )
        .await;
        let finished_at = Utc::now();

        match attempted.result {
            Ok(()) => {
                info!(stage = %def.name, attempts = attempted.attempts, "Stage succeeded");
                ctx.emit(
                    STAGE_COMPLETED,
                    json!({
                        "stage": def.name,
                        "attempts": attempted.attempts,
                        "duration_ms": (finished_at - started_at).num_milliseconds(),
                    }),
                );
                StageResult::success(&def.name, attempted.attempts, started_at, finished_at)
            }
            Err(err) => {
                let err = match (err.is_retryable(), ctx.cancellation().reason()) {
                    (true, Some(reason)) => StageError::Cancelled(reason),
                    _ => err,
                };
                error!(
                    stage = %def.name,
                    attempts = attempted.attempts,
                    kind = %err.kind(),
                    error = %err,
                    "Stage failed"
                );
                ctx.emit(
                    STAGE_FAILED,
                    json!({
                        "stage": def.name,
                        "attempts": attempted.attempts,
                        "error": err.to_string(),
                    }),
                );
                StageResult::failed(
                    &def.name,
                    attempted.attempts,
                    StageFailure::from(&err),
                    started_at,
                    finished_at,
                )
            }
        }
    }

    fn report(&self, ctx: &RunContext, run: &PipelineRun) {
        let duration_ms = run.duration_ms();
        match &run.outcome {
            RunOutcome::Success => {
                info!(pipeline = %self.name, run_id = %run.run_id, duration_ms, "Pipeline run succeeded");
                ctx.emit(PIPELINE_COMPLETED, json!({ "duration_ms": duration_ms }));
            }
            RunOutcome::Failed { stage, error, skipped } => {
                error!(
                    pipeline = %self.name,
                    run_id = %run.run_id,
                    stage = %stage,
                    error = %error,
                    skipped = ?skipped,
                    "Pipeline run failed"
                );
                ctx.emit(
                    PIPELINE_FAILED,
                    json!({ "stage": stage, "error": error, "skipped": skipped }),
                );
            }
            RunOutcome::Cancelled { reason, skipped } => {
                warn!(
                    pipeline = %self.name,
                    run_id = %run.run_id,
                    reason = %reason,
                    skipped = ?skipped,
                    "Pipeline run cancelled"
                );
                ctx.emit(PIPELINE_CANCELLED, json!({ "reason": reason, "skipped": skipped }));
            }
        }
    }
}

/// Kahn's algorithm; among ready stages the earliest declared runs first.
fn topological_sort(stages: &HashMap<String, StageDefinition>, stage_order: &[String]) -> Vec<String> {
    let position: HashMap<&str, usize> = stage_order
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let mut in_degree: Vec<usize> = stage_order
        .iter()
        .map(|name| stages.get(name).map_or(0, |def| def.dependencies.len()))
        .collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); stage_order.len()];
    for (i, name) in stage_order.iter().enumerate() {
        if let Some(def) = stages.get(name) {
            for dep in &def.dependencies {
                if let Some(&d) = position.get(dep.as_str()) {
                    dependents[d].push(i);
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..stage_order.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut result = Vec::with_capacity(stage_order.len());
    while let Some(i) = ready.pop_first() {
        result.push(stage_order[i].clone());
        for &child in &dependents[i] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineBuilder;
    use crate::stages::{NoOpStage, Stage};
    use crate::testing::{test_context, ScriptedStage};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn noop(name: &str) -> Arc<dyn Stage> {
        Arc::new(NoOpStage::new(name))
    }

    #[test]
    fn test_topological_order_respects_declaration_ties() {
        let graph = PipelineBuilder::new("test")
            .stage("ingest", noop("ingest"), &["download_orders", "download_inventory"])
            .stage("download_orders", noop("download_orders"), &[])
            .stage("download_inventory", noop("download_inventory"), &[])
            .stage("report", noop("report"), &["ingest"])
            .build()
            .unwrap();

        assert_eq!(
            graph.execution_order(),
            &["download_orders", "download_inventory", "ingest", "report"]
        );
    }

    #[tokio::test]
    async fn test_graph_execution_records_results_in_order() {
        let graph = PipelineBuilder::new("test")
            .stage("stage1", noop("stage1"), &[])
            .stage("stage2", noop("stage2"), &["stage1"])
            .build()
            .unwrap();
        let ctx = test_context();

        let run = graph.execute(&ctx).await;

        assert!(run.is_success());
        assert_eq!(run.executed_stages(), vec!["stage1", "stage2"]);
        assert_eq!(ctx.results().len(), 2);
        assert_eq!(run.run_id, ctx.run_id());
    }

    #[tokio::test]
    async fn test_failure_halts_and_lists_skipped() {
        let graph = PipelineBuilder::new("test")
            .stage("a", noop("a"), &[])
            .add_stage(
                StageDefinition::new(
                    "b",
                    Arc::new(ScriptedStage::new("b").always_failing(StageError::fatal("broken"))),
                )
                .with_dependency("a"),
            )
            .stage("c", noop("c"), &["b"])
            .build()
            .unwrap();

        let run = graph.execute(&test_context()).await;

        assert_eq!(run.failed_stage(), Some("b"));
        assert_eq!(run.outcome.skipped(), &["c".to_string()]);
        assert_eq!(run.result("b").map(StageResult::attempts_used), Some(1));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let graph = PipelineBuilder::new("test").stage("a", noop("a"), &[]).build().unwrap();
        let ctx = test_context();
        ctx.cancellation().cancel("operator stop");

        let run = graph.execute(&ctx).await;

        assert!(run.results.is_empty());
        assert_eq!(
            run.outcome,
            RunOutcome::Cancelled {
                reason: "operator stop".into(),
                skipped: vec!["a".into()],
            }
        );
    }

    #[tokio::test]
    async fn test_unsatisfied_dependency_is_fatal() {
        let graph = PipelineBuilder::new("test")
            .stage("a", noop("a"), &[])
            .stage("b", noop("b"), &["a"])
            .build()
            .unwrap();
        let ctx = test_context();
        let def = graph.definition("b").unwrap();

        let result = graph.run_stage(def, &ctx).await;

        assert_eq!(result.attempts_used(), 0);
        assert_eq!(
            result.error().map(|e| e.kind),
            Some(FailureKind::DependencyNotSatisfied)
        );
    }
}
