//! Logging and tracing setup for the qlens binary
//!
//! Console output goes to stderr so reports printed on stdout stay
//! machine-readable. An optional JSON file layer rolls daily under the local
//! data directory. `RUST_LOG` overrides the configured filter.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory where JSON log files are written
    pub log_dir: PathBuf,

    /// Whether to write JSON logs to a rolling file
    pub enable_json_logs: bool,

    /// Whether to write human-readable logs to stderr
    pub enable_console_logs: bool,

    /// Whether to include file/line information in console logs
    pub include_location: bool,

    /// Whether to log span open/close events (loop iterations, ingestion)
    pub enable_spans: bool,

    /// Default filter when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: log_directory(),
            enable_json_logs: false,
            enable_console_logs: true,
            include_location: cfg!(debug_assertions),
            enable_spans: false,
            default_filter: "warn,qlens_cli=info,qlens_monitor=info,qlens_analyzer=info,qlens_core=info"
                .to_string(),
        }
    }
}

impl LoggingConfig {
    /// Quiet console, JSON file logs for later inspection
    pub fn production() -> Self {
        Self {
            log_dir: log_directory(),
            enable_json_logs: true,
            enable_console_logs: true,
            include_location: false,
            enable_spans: false,
            default_filter: "warn,qlens_monitor=info".to_string(),
        }
    }

    /// Verbose console output including loop spans
    pub fn development() -> Self {
        Self {
            enable_spans: true,
            default_filter: "info,qlens_cli=debug,qlens_monitor=debug,qlens_analyzer=debug,qlens_core=debug"
                .to_string(),
            ..Self::default()
        }
    }

    /// Builder method: enable the JSON file layer
    pub fn with_json_logs(mut self, enabled: bool) -> Self {
        self.enable_json_logs = enabled;
        self
    }
}

/// Initializes the global subscriber.
///
/// The returned guard flushes the JSON file writer on drop and must be held
/// until the process exits. Fails if a subscriber is already installed.
pub fn init(config: LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();
    let mut guard = None;

    if config.enable_console_logs {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events.clone())
            .with_ansi(true)
            .compact()
            .with_filter(env_filter.clone())
            .boxed();

        layers.push(console_layer);
    }

    if config.enable_json_logs {
        std::fs::create_dir_all(&config.log_dir)?;
        let file_appender = tracing_appender::rolling::daily(&config.log_dir, "qlens.log");
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(env_filter)
            .boxed();

        layers.push(json_layer);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        log_dir = %config.log_dir.display(),
        json_enabled = config.enable_json_logs,
        console_enabled = config.enable_console_logs,
        "Logging initialized"
    );

    Ok(guard)
}

/// Directory for JSON log files
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("qlens")
        .join("logs")
}
