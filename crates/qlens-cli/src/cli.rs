//! qlens - query performance analysis from the command line

mod logging;
mod output;
mod replay;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use qlens_core::{EngineConfig, RecordingMetrics};
use qlens_monitor::{QueryPerformanceEngine, Scheduler};
use serde::Serialize;

use crate::logging::LoggingConfig;
use crate::replay::{ReplaySource, read_log};

#[derive(Parser)]
#[command(name = "qlens")]
#[command(about = "Query performance analysis and optimization advice")]
#[command(version)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, global = true, env = "QLENS_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging, including loop spans
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write JSON logs to the qlens log directory
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a single statement and print suggestions
    Analyze {
        /// Statement text
        sql: String,

        /// Observed duration; records the statement as one execution
        #[arg(long)]
        duration_ms: Option<f64>,

        #[arg(long)]
        rows_examined: Option<u64>,

        #[arg(long)]
        rows_returned: Option<u64>,

        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Feed a JSON-lines execution log through the engine and print the report
    Replay {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Run the background loops against a log-backed live source
    Watch {
        file: PathBuf,

        /// How long to run before printing the report
        #[arg(long, default_value = "10")]
        seconds: u64,

        #[arg(long)]
        json: bool,
    },

    /// Validate and print the effective configuration
    Config {
        /// Print only the path the configuration was loaded from
        #[arg(long)]
        path: bool,
    },
}

#[derive(Serialize)]
struct ReportOutput<'a> {
    report: &'a qlens_monitor::OptimizationReport,
    metrics: std::collections::BTreeMap<String, u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _log_guard = logging::init(logging_config(cli.verbose, cli.log_json))?;

    let (config, source_path) = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Analyze {
            sql,
            duration_ms,
            rows_examined,
            rows_returned,
            json,
        } => {
            let engine = QueryPerformanceEngine::new(config)?;
            let result = engine
                .analyze_query(&sql, duration_ms, rows_examined, rows_returned)
                .await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", output::render_analysis(&result));
            }
        }
        Command::Replay { file, json } => {
            let records = read_log(&file)?;
            let metrics = Arc::new(RecordingMetrics::new());
            let engine = QueryPerformanceEngine::new(config)?.with_metrics(metrics.clone());

            let mut degraded = 0;
            for record in &records {
                let result = engine
                    .analyze_query(
                        &record.query,
                        record.duration_ms,
                        record.rows_examined,
                        record.rows_returned,
                    )
                    .await;
                if result.is_degraded() {
                    degraded += 1;
                }
            }
            engine.periodic_analysis_pass().await?;
            tracing::info!(records = records.len(), degraded, "replay complete");

            print_report(&engine, &metrics, json)?;
        }
        Command::Watch {
            file,
            seconds,
            json,
        } => {
            let records = read_log(&file)?;
            let source = ReplaySource::new(&records, config.slow_query_threshold_ms);
            tracing::info!(
                statements = source.statements().len(),
                "watching slow statements from {}",
                file.display()
            );

            let metrics = Arc::new(RecordingMetrics::new());
            let engine = QueryPerformanceEngine::new(config.with_live_loop(true))?
                .with_source(Arc::new(source))
                .with_metrics(metrics.clone());
            let scheduler = Scheduler::new(Arc::new(engine));
            scheduler.start()?;

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted, stopping");
                }
            }
            scheduler.stop().await;

            print_report(scheduler.engine(), &metrics, json)?;
        }
        Command::Config { path } => {
            if path {
                match source_path {
                    Some(path) => println!("{}", path.display()),
                    None => println!("(defaults)"),
                }
            } else {
                print!("{}", config.to_toml_string()?);
            }
        }
    }

    Ok(())
}

fn logging_config(verbose: bool, log_json: bool) -> LoggingConfig {
    match (verbose, log_json) {
        (true, json) => LoggingConfig::development().with_json_logs(json),
        (false, true) => LoggingConfig::production(),
        (false, false) => LoggingConfig::default(),
    }
}

/// Resolves the configuration: `--config`, then the user config file, then defaults
fn load_config(explicit: Option<&Path>) -> anyhow::Result<(EngineConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let config = EngineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        return Ok((config, Some(path.to_path_buf())));
    }

    if let Some(path) = default_config_path().filter(|p| p.exists()) {
        let config = EngineConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        return Ok((config, Some(path)));
    }

    Ok((EngineConfig::default(), None))
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("qlens").join("config.toml"))
}

fn print_report(
    engine: &QueryPerformanceEngine,
    metrics: &RecordingMetrics,
    json: bool,
) -> anyhow::Result<()> {
    let report = engine.optimization_report();
    if json {
        let out = ReportOutput {
            report: &report,
            metrics: metrics.counters(),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", output::render_report(&report));
        println!(
            "\n{} suggestions emitted, {} slow query alerts",
            metrics.counter_total("suggestions_emitted:"),
            metrics.counter_total("slow_query_alerts:")
        );
    }
    Ok(())
}
