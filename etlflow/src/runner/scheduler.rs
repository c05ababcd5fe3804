//! Fixed-interval scheduling without catch-up.

use super::{Runner, TriggerOutcome};
use crate::cancellation::CancellationToken;
use crate::utils::Timestamp;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info};

/// The first fire time strictly after `now` on the grid `start_epoch + k * interval`.
///
/// Before the epoch the epoch itself is returned. Fire times already in the
/// past are never returned, so triggers missed while the process was down are
/// not backfilled.
#[must_use]
pub fn next_fire_after(start_epoch: Timestamp, interval: Duration, now: Timestamp) -> Timestamp {
    if now < start_epoch {
        return start_epoch;
    }
    let step = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX).max(1);
    let elapsed = (now - start_epoch).num_milliseconds();
    let offset = (elapsed / step).saturating_add(1).saturating_mul(step);
    TimeDelta::try_milliseconds(offset)
        .and_then(|delta| start_epoch.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Counts of what the scheduler did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Triggers fired.
    pub fired: u32,
    /// Runs that finished successfully.
    pub succeeded: u32,
    /// Runs that failed, were cancelled or could not start.
    pub failed: u32,
    /// Triggers dropped because a run was in progress.
    pub skipped: u32,
}

impl SchedulerStats {
    fn record(&mut self, outcome: &Result<TriggerOutcome, crate::errors::EtlError>) {
        match outcome {
            Ok(TriggerOutcome::Skipped) => self.skipped += 1,
            Ok(TriggerOutcome::Completed(run)) if run.is_success() => self.succeeded += 1,
            Ok(TriggerOutcome::Completed(_)) | Err(_) => self.failed += 1,
        }
    }
}

/// Fires a [`Runner`] on a fixed interval until shut down.
///
/// Each trigger runs on its own task so a long run does not delay the clock;
/// overlapping triggers are resolved by the runner's overlap policy.
#[derive(Debug)]
pub struct Scheduler {
    runner: Arc<Runner>,
    start_epoch: Timestamp,
    interval: Duration,
    run_on_start: bool,
    shutdown: Arc<CancellationToken>,
}

impl Scheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(runner: Arc<Runner>, start_epoch: Timestamp, interval: Duration) -> Self {
        Self {
            runner,
            start_epoch,
            interval,
            run_on_start: false,
            shutdown: Arc::new(CancellationToken::new()),
        }
    }

    /// Also triggers once immediately at startup.
    #[must_use]
    pub fn with_run_on_start(mut self, enabled: bool) -> Self {
        self.run_on_start = enabled;
        self
    }

    /// Token that stops the scheduler when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> Arc<CancellationToken> {
        self.shutdown.clone()
    }

    /// Runs until the shutdown token is cancelled.
    ///
    /// On shutdown the runner is closed: the in-flight run is cancelled before
    /// its next stage, queued triggers are dropped, and spawned tasks are awaited.
    pub async fn run(self) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        let mut tasks = JoinSet::new();
        let mut last_fired: Option<Timestamp> = None;

        info!(
            pipeline = %self.runner.graph().name(),
            start_epoch = %self.start_epoch,
            interval_secs = self.interval.as_secs(),
            "Scheduler started"
        );

        if self.run_on_start && !self.shutdown.is_cancelled() {
            self.fire(&mut tasks, &mut stats, Utc::now());
        }

        loop {
            let now = Utc::now();
            let after = last_fired.map_or(now, |fired| fired.max(now));
            let next = next_fire_after(self.start_epoch, self.interval, after);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(wait) => {
                    last_fired = Some(next);
                    self.fire(&mut tasks, &mut stats, next);
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    Self::collect(&mut stats, joined);
                }
            }
        }

        info!(pipeline = %self.runner.graph().name(), "Scheduler stopping");
        self.runner.close("scheduler shutdown");
        while let Some(joined) = tasks.join_next().await {
            Self::collect(&mut stats, joined);
        }
        stats
    }

    fn fire(
        &self,
        tasks: &mut JoinSet<Result<TriggerOutcome, crate::errors::EtlError>>,
        stats: &mut SchedulerStats,
        scheduled_for: Timestamp,
    ) {
        stats.fired += 1;
        info!(
            pipeline = %self.runner.graph().name(),
            scheduled_for = %scheduled_for,
            "Triggering scheduled run"
        );
        let runner = self.runner.clone();
        tasks.spawn(async move { runner.trigger_run().await });
    }

    fn collect(
        stats: &mut SchedulerStats,
        joined: Result<Result<TriggerOutcome, crate::errors::EtlError>, tokio::task::JoinError>,
    ) {
        match joined {
            Ok(outcome) => {
                if let Err(err) = &outcome {
                    error!(error = %err, "Scheduled run could not start");
                }
                stats.record(&outcome);
            }
            Err(err) => {
                error!(error = %err, "Scheduled run task panicked");
                stats.failed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryStorage;
    use crate::pipeline::PipelineBuilder;
    use crate::runner::OverlapPolicy;
    use crate::testing::{ScriptedFetcher, ScriptedStage};
    use chrono::TimeZone;

    fn epoch() -> Timestamp {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
    }

    const TWO_HOURS: Duration = Duration::from_secs(2 * 60 * 60);

    #[test]
    fn test_before_epoch_fires_at_epoch() {
        let now = Utc.with_ymd_and_hms(2022, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(next_fire_after(epoch(), TWO_HOURS, now), epoch());
    }

    #[test]
    fn test_on_grid_point_moves_to_next() {
        let now = Utc.with_ymd_and_hms(2023, 1, 1, 4, 0, 0).unwrap();
        assert_eq!(
            next_fire_after(epoch(), TWO_HOURS, now),
            Utc.with_ymd_and_hms(2023, 1, 1, 6, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_missed_fires_are_not_backfilled() {
        // Down for a week: the next fire is the first grid point after now.
        let now = Utc.with_ymd_and_hms(2023, 1, 8, 5, 17, 0).unwrap();
        assert_eq!(
            next_fire_after(epoch(), TWO_HOURS, now),
            Utc.with_ymd_and_hms(2023, 1, 8, 6, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_scheduler_fires_and_stops() {
        let stage = Arc::new(ScriptedStage::new("work"));
        let graph = PipelineBuilder::new("test").stage("work", stage.clone(), &[]).build().unwrap();
        let runner = Arc::new(Runner::new(
            graph,
            Arc::new(MemoryStorage::new()),
            Arc::new(ScriptedFetcher::new(Vec::new())),
        ));

        let scheduler = Scheduler::new(runner, Utc::now(), Duration::from_millis(20));
        let shutdown = scheduler.shutdown_token();
        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_millis(150)).await;
        shutdown.cancel("test done");
        let stats = handle.await.unwrap();

        assert!(stats.fired >= 2, "fired {}", stats.fired);
        assert_eq!(stats.fired, stats.succeeded + stats.failed + stats.skipped);
        assert_eq!(stage.calls(), stats.succeeded);
    }

    #[tokio::test]
    async fn test_shutdown_drops_queued_triggers() {
        let stage = Arc::new(ScriptedStage::new("work").with_delay(Duration::from_millis(300)));
        let graph = PipelineBuilder::new("test").stage("work", stage.clone(), &[]).build().unwrap();
        let runner = Arc::new(
            Runner::new(
                graph,
                Arc::new(MemoryStorage::new()),
                Arc::new(ScriptedFetcher::new(Vec::new())),
            )
            .with_overlap_policy(OverlapPolicy::Queue),
        );

        let scheduler = Scheduler::new(runner.clone(), Utc::now(), Duration::from_millis(20));
        let shutdown = scheduler.shutdown_token();
        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_millis(120)).await;
        shutdown.cancel("test done");
        let stats = handle.await.unwrap();

        assert!(runner.is_closed());
        assert_eq!(stage.calls(), 1);
        assert!(stats.skipped >= 1, "skipped {}", stats.skipped);
        assert_eq!(stats.fired, stats.succeeded + stats.failed + stats.skipped);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_fire() {
        let graph = PipelineBuilder::new("test")
            .stage("work", Arc::new(ScriptedStage::new("work")), &[])
            .build()
            .unwrap();
        let runner = Arc::new(Runner::new(
            graph,
            Arc::new(MemoryStorage::new()),
            Arc::new(ScriptedFetcher::new(Vec::new())),
        ));
        let scheduler = Scheduler::new(runner, Utc::now(), Duration::from_secs(3600));
        scheduler.shutdown_token().cancel("stop");

        assert_eq!(scheduler.run().await, SchedulerStats::default());
    }
}
