//! Etlflow CLI: run the e-commerce pipeline once or on its schedule.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use etlflow::config::{load_config, LogFormat, PipelineConfig};
use etlflow::ecommerce::ecommerce_runner;
use etlflow::events::LoggingEventSink;
use etlflow::io::HttpFetcher;
use etlflow::observability::init_tracing;
use etlflow::runner::{Scheduler, TriggerOutcome};
use etlflow::stages::LogReportSink;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Batch ETL pipeline runner
#[derive(Parser, Debug)]
#[command(name = "etlflow", version, about, long_about = None)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline once and exit with its status
    Run,
    /// Run the pipeline on its interval until Ctrl-C
    Schedule {
        /// Also trigger a run immediately at startup
        #[arg(long)]
        run_now: bool,
    },
    /// Print the effective configuration
    ShowConfig,
}

fn apply_cli_overrides(config: &mut PipelineConfig, cli: &Cli) {
    if cli.json_logs {
        config.logging.format = LogFormat::Json;
    }
    match cli.verbose {
        0 => {}
        1 => config.logging.level = "debug".to_string(),
        _ => config.logging.level = "trace".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref()).context("loading configuration")?;
    apply_cli_overrides(&mut config, &cli);
    init_tracing(&config.logging);

    if matches!(cli.command, Commands::ShowConfig) {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    let fetcher = HttpFetcher::new(Duration::from_secs(config.http.timeout_secs))
        .context("building HTTP client")?;
    let runner = Arc::new(
        ecommerce_runner(
            &config,
            Arc::new(fetcher),
            Arc::new(LogReportSink),
            Arc::new(LoggingEventSink::default()),
        )
        .context("building pipeline")?,
    );

    match cli.command {
        Commands::Run => {
            let outcome = runner.trigger_run().await.context("starting run")?;
            match outcome {
                TriggerOutcome::Completed(run) if run.is_success() => Ok(ExitCode::SUCCESS),
                TriggerOutcome::Completed(run) => {
                    eprintln!("{}: {}", run.pipeline, run.outcome);
                    Ok(ExitCode::FAILURE)
                }
                TriggerOutcome::Skipped => Ok(ExitCode::FAILURE),
            }
        }
        Commands::Schedule { run_now } => {
            let scheduler = Scheduler::new(
                runner,
                config.schedule.start_epoch,
                config.schedule.interval(),
            )
            .with_run_on_start(run_now);
            let shutdown = scheduler.shutdown_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    shutdown.cancel("interrupted");
                }
            });

            let stats = scheduler.run().await;
            tracing::info!(
                fired = stats.fired,
                succeeded = stats.succeeded,
                failed = stats.failed,
                skipped = stats.skipped,
                "Scheduler stopped"
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::ShowConfig => Ok(ExitCode::SUCCESS),
    }
}
