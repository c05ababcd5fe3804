//! Scripted collaborators for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::context::RunContext;
use crate::errors::{FetchError, StageError};
use crate::io::Fetcher;
use crate::stages::{QuantityReport, ReportSink, Stage};

/// A fetcher that serves canned bodies and can fail its first calls.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    default_body: Vec<u8>,
    bodies: HashMap<String, Vec<u8>>,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    /// Creates a fetcher returning `body` for every URL.
    #[must_use]
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            default_body: body,
            ..Self::default()
        }
    }

    /// Returns `body` for one specific URL.
    #[must_use]
    pub fn with_response(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.into(), body.into());
        self
    }

    /// Makes the first `n` calls fail with a request error.
    #[must_use]
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Number of fetch calls, including failed ones.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// URLs requested, in call order.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(url.to_string());

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(FetchError::Request {
                url: url.to_string(),
                reason: "scripted failure".to_string(),
            });
        }

        Ok(self
            .bodies
            .get(url)
            .unwrap_or(&self.default_body)
            .clone())
    }
}

/// A stage that fails a scripted number of times and counts its calls.
#[derive(Debug)]
pub struct ScriptedStage {
    name: String,
    failures: u32,
    error: StageError,
    delay: Option<Duration>,
    calls: AtomicU32,
    log: Option<Arc<Mutex<Vec<String>>>>,
}

impl ScriptedStage {
    /// Creates a stage that always succeeds.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failures: 0,
            error: StageError::transient("scripted failure"),
            delay: None,
            calls: AtomicU32::new(0),
            log: None,
        }
    }

    /// Fails the first `n` calls with `error`.
    #[must_use]
    pub fn failing_first(mut self, n: u32, error: StageError) -> Self {
        self.failures = n;
        self.error = error;
        self
    }

    /// Fails every call with `error`.
    #[must_use]
    pub fn always_failing(self, error: StageError) -> Self {
        self.failing_first(u32::MAX, error)
    }

    /// Sleeps for `delay` on every call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Appends the stage name to `log` on every call.
    #[must_use]
    pub fn with_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = Some(log);
        self
    }

    /// Number of times the stage ran.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &RunContext) -> Result<(), StageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock().push(self.name.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if call < self.failures {
            return Err(self.error.clone());
        }
        Ok(())
    }
}

/// A report sink that keeps every published report.
#[derive(Debug, Default)]
pub struct CollectingReportSink {
    reports: Mutex<Vec<QuantityReport>>,
}

impl CollectingReportSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports published so far.
    #[must_use]
    pub fn reports(&self) -> Vec<QuantityReport> {
        self.reports.lock().clone()
    }
}

impl ReportSink for CollectingReportSink {
    fn publish(&self, _pipeline: &str, report: &QuantityReport) -> Result<(), StageError> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;

    #[tokio::test]
    async fn test_scripted_fetcher_fails_then_serves() {
        let fetcher = ScriptedFetcher::new(b"default".to_vec())
            .with_response("http://a", b"a".to_vec())
            .failing_first(1);

        assert!(fetcher.fetch("http://a").await.is_err());
        assert_eq!(fetcher.fetch("http://a").await.unwrap(), b"a");
        assert_eq!(fetcher.fetch("http://b").await.unwrap(), b"default");
        assert_eq!(fetcher.calls(), 3);
        assert_eq!(fetcher.urls(), vec!["http://a", "http://a", "http://b"]);
    }

    #[tokio::test]
    async fn test_scripted_stage_fails_first_calls() {
        let stage = ScriptedStage::new("flaky").failing_first(2, StageError::transient("down"));
        let ctx = test_context();

        assert!(stage.run(&ctx).await.is_err());
        assert!(stage.run(&ctx).await.is_err());
        assert!(stage.run(&ctx).await.is_ok());
        assert_eq!(stage.calls(), 3);
    }
}
