//! Engine configuration
//!
//! Configuration is static for the lifetime of an engine. It can be built in
//! code with the `with_*` builders or loaded from a TOML file; both paths end
//! in [`EngineConfig::validate`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{QlensError, Result};

/// Configuration for the query performance engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Average duration above which a fingerprint counts as slow (ms)
    pub slow_query_threshold_ms: f64,
    /// Rows examined above which partitioning is suggested
    pub high_row_scan_threshold: u64,
    /// Fingerprints idle longer than this are evicted by cleanup
    pub stats_retention_hours: u64,
    /// Maximum number of cached execution plans
    pub plan_cache_max_entries: usize,
    /// Live monitoring loop interval (seconds)
    pub live_loop_interval_sec: u64,
    /// Periodic trend analysis loop interval (seconds)
    pub periodic_loop_interval_sec: u64,
    /// Cleanup loop interval (seconds)
    pub cleanup_interval_sec: u64,
    /// Upper bound on suggestions kept per fingerprint
    pub max_suggestions_per_query: usize,
    /// Executions required before slow-query rules fire
    pub alert_threshold_executions: u64,
    /// Fetch and cache execution plans during ingestion
    pub enable_plan_caching: bool,
    /// Run the live monitoring loop
    pub enable_live_loop: bool,
    /// Timeout applied to every external collaborator call (ms)
    pub external_call_timeout_ms: u64,
    /// Maximum number of live statements pulled per tick
    pub live_batch_size: usize,
    /// Number of fingerprints listed in the report's slowest-queries section
    pub report_top_queries: usize,
    /// Number of suggestions listed in the report's global ranking
    pub report_top_suggestions: usize,
    /// Minimum executions before a fingerprint gets a trend classification
    pub trend_min_executions: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: 1000.0,
            high_row_scan_threshold: 10_000,
            stats_retention_hours: 24,
            plan_cache_max_entries: 1000,
            live_loop_interval_sec: 1,
            periodic_loop_interval_sec: 300,
            cleanup_interval_sec: 3600,
            max_suggestions_per_query: 5,
            alert_threshold_executions: 10,
            enable_plan_caching: true,
            enable_live_loop: false,
            external_call_timeout_ms: 5000,
            live_batch_size: 50,
            report_top_queries: 10,
            report_top_suggestions: 20,
            trend_min_executions: 5,
        }
    }
}

impl EngineConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded engine configuration");
        Ok(config)
    }

    /// Serialize the config back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| QlensError::Other(e.to_string()))
    }

    /// Check every threshold and interval, failing on the first invalid one
    pub fn validate(&self) -> Result<()> {
        if !self.slow_query_threshold_ms.is_finite() || self.slow_query_threshold_ms <= 0.0 {
            return Err(QlensError::Configuration(format!(
                "slow_query_threshold_ms must be a positive number, got {}",
                self.slow_query_threshold_ms
            )));
        }

        let positive = [
            ("high_row_scan_threshold", self.high_row_scan_threshold),
            ("stats_retention_hours", self.stats_retention_hours),
            ("live_loop_interval_sec", self.live_loop_interval_sec),
            ("periodic_loop_interval_sec", self.periodic_loop_interval_sec),
            ("cleanup_interval_sec", self.cleanup_interval_sec),
            ("alert_threshold_executions", self.alert_threshold_executions),
            ("external_call_timeout_ms", self.external_call_timeout_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(QlensError::Configuration(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if retention_window(self.stats_retention_hours).is_none() {
            return Err(QlensError::Configuration(format!(
                "stats_retention_hours is out of range, got {}",
                self.stats_retention_hours
            )));
        }

        let sizes = [
            ("plan_cache_max_entries", self.plan_cache_max_entries),
            ("max_suggestions_per_query", self.max_suggestions_per_query),
            ("live_batch_size", self.live_batch_size),
            ("report_top_queries", self.report_top_queries),
            ("report_top_suggestions", self.report_top_suggestions),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(QlensError::Configuration(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Set the slow query threshold
    pub fn with_slow_query_threshold_ms(mut self, threshold_ms: f64) -> Self {
        self.slow_query_threshold_ms = threshold_ms;
        self
    }

    /// Set the high row scan threshold
    pub fn with_high_row_scan_threshold(mut self, rows: u64) -> Self {
        self.high_row_scan_threshold = rows;
        self
    }

    /// Set the statistics retention window
    pub fn with_stats_retention_hours(mut self, hours: u64) -> Self {
        self.stats_retention_hours = hours;
        self
    }

    /// Set the plan cache capacity
    pub fn with_plan_cache_max_entries(mut self, entries: usize) -> Self {
        self.plan_cache_max_entries = entries;
        self
    }

    /// Set the live loop interval
    pub fn with_live_loop_interval_sec(mut self, secs: u64) -> Self {
        self.live_loop_interval_sec = secs;
        self
    }

    /// Set the periodic loop interval
    pub fn with_periodic_loop_interval_sec(mut self, secs: u64) -> Self {
        self.periodic_loop_interval_sec = secs;
        self
    }

    /// Set the cleanup loop interval
    pub fn with_cleanup_interval_sec(mut self, secs: u64) -> Self {
        self.cleanup_interval_sec = secs;
        self
    }

    /// Set the per-fingerprint suggestion limit
    pub fn with_max_suggestions_per_query(mut self, max: usize) -> Self {
        self.max_suggestions_per_query = max;
        self
    }

    /// Set the execution count required before slow-query rules fire
    pub fn with_alert_threshold_executions(mut self, executions: u64) -> Self {
        self.alert_threshold_executions = executions;
        self
    }

    /// Enable or disable plan caching
    pub fn with_plan_caching(mut self, enabled: bool) -> Self {
        self.enable_plan_caching = enabled;
        self
    }

    /// Enable or disable the live monitoring loop
    pub fn with_live_loop(mut self, enabled: bool) -> Self {
        self.enable_live_loop = enabled;
        self
    }

    /// Set the external call timeout
    pub fn with_external_call_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.external_call_timeout_ms = timeout_ms;
        self
    }

    /// Set the live batch size
    pub fn with_live_batch_size(mut self, size: usize) -> Self {
        self.live_batch_size = size;
        self
    }

    /// Set the minimum executions for trend classification
    pub fn with_trend_min_executions(mut self, executions: u64) -> Self {
        self.trend_min_executions = executions;
        self
    }

    pub fn live_loop_interval(&self) -> Duration {
        Duration::from_secs(self.live_loop_interval_sec)
    }

    pub fn periodic_loop_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_loop_interval_sec)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_sec)
    }

    pub fn external_call_timeout(&self) -> Duration {
        Duration::from_millis(self.external_call_timeout_ms)
    }

    /// Retention window as a chrono duration, for comparisons against timestamps
    pub fn stats_retention(&self) -> chrono::Duration {
        retention_window(self.stats_retention_hours).unwrap_or(chrono::Duration::MAX)
    }
}

fn retention_window(hours: u64) -> Option<chrono::Duration> {
    i64::try_from(hours).ok().and_then(chrono::Duration::try_hours)
}
