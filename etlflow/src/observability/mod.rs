//! Logging initialization and span helpers.

use crate::config::{LogFormat, LoggingConfig};
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level` when set. Returns false if a
/// subscriber was already installed, which leaves the existing one in place.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).try_init(),
    };
    installed.is_ok()
}

/// Span covering one pipeline run.
#[must_use]
pub fn pipeline_span(pipeline: &str, run_id: Uuid) -> Span {
    tracing::info_span!("pipeline", pipeline = pipeline, run_id = %run_id)
}

/// Span covering one stage, across all of its attempts.
#[must_use]
pub fn stage_span(stage: &str) -> Span {
    tracing::info_span!("stage", stage = stage)
}
