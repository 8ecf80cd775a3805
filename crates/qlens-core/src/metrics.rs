//! Pluggable metrics sink
//!
//! The engine reports counters, gauges and histogram observations through
//! [`MetricsSink`]. Every method has a no-op default so an exporter only
//! overrides what it supports.

use std::collections::BTreeMap;

use parking_lot::Mutex;

/// Destination for engine metrics
pub trait MetricsSink: Send + Sync {
    /// A suggestion was emitted (labels: suggestion type, severity)
    fn suggestion_emitted(&self, _suggestion_type: &str, _severity: &str) {}

    /// A fingerprint crossed into the slow state (labels: severity, table)
    fn slow_query_alert(&self, _severity: &str, _table: &str) {}

    /// Latest performance score of a fingerprint
    fn performance_score(&self, _fingerprint: &str, _score: f64) {}

    /// Latest effectiveness ratio of an index
    fn index_effectiveness(&self, _table: &str, _index: &str, _ratio: f64) {}

    /// One execution duration observation
    fn execution_duration(
        &self,
        _query_type: &str,
        _primary_table: &str,
        _optimization_level: &str,
        _duration_ms: f64,
    ) {
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

/// Optimization level label derived from a performance score
pub fn optimization_level(score: f64) -> &'static str {
    if score >= 80.0 {
        "optimal"
    } else if score >= 50.0 {
        "acceptable"
    } else {
        "needs_optimization"
    }
}

/// Running count and sum of one histogram's observations
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Observed {
    pub count: u64,
    pub sum: f64,
}

impl Observed {
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

#[derive(Debug, Default, Clone)]
struct Recorded {
    counters: BTreeMap<String, u64>,
    gauges: BTreeMap<String, f64>,
    observations: BTreeMap<String, Observed>,
}

/// In-memory sink keeping every counter and gauge, plus a count and sum per
/// histogram.
///
/// Keys are the metric name followed by its labels, joined with `:`
/// (e.g. `suggestions_emitted:add-index:high`).
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    inner: Mutex<Recorded>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter (0 if never incremented)
    pub fn counter(&self, key: &str) -> u64 {
        self.inner.lock().counters.get(key).copied().unwrap_or(0)
    }

    /// Sum of every counter whose key starts with `prefix`
    pub fn counter_total(&self, prefix: &str) -> u64 {
        self.inner
            .lock()
            .counters
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(_, v)| *v)
            .sum()
    }

    /// Latest value of a gauge
    pub fn gauge(&self, key: &str) -> Option<f64> {
        self.inner.lock().gauges.get(key).copied()
    }

    /// Number of histogram observations under `key`
    pub fn observation_count(&self, key: &str) -> u64 {
        self.observed(key).count
    }

    /// Count and sum of the histogram under `key`
    pub fn observed(&self, key: &str) -> Observed {
        self.inner
            .lock()
            .observations
            .get(key)
            .copied()
            .unwrap_or_default()
    }

    /// Snapshot of all counters
    pub fn counters(&self) -> BTreeMap<String, u64> {
        self.inner.lock().counters.clone()
    }

    fn increment(&self, key: String) {
        *self.inner.lock().counters.entry(key).or_insert(0) += 1;
    }
}

impl MetricsSink for RecordingMetrics {
    fn suggestion_emitted(&self, suggestion_type: &str, severity: &str) {
        self.increment(format!("suggestions_emitted:{}:{}", suggestion_type, severity));
    }

    fn slow_query_alert(&self, severity: &str, table: &str) {
        self.increment(format!("slow_query_alerts:{}:{}", severity, table));
    }

    fn performance_score(&self, fingerprint: &str, score: f64) {
        self.inner
            .lock()
            .gauges
            .insert(format!("performance_score:{}", fingerprint), score);
    }

    fn index_effectiveness(&self, table: &str, index: &str, ratio: f64) {
        self.inner
            .lock()
            .gauges
            .insert(format!("index_effectiveness:{}:{}", table, index), ratio);
    }

    fn execution_duration(
        &self,
        query_type: &str,
        primary_table: &str,
        optimization_level: &str,
        duration_ms: f64,
    ) {
        let mut inner = self.inner.lock();
        let observed = inner
            .observations
            .entry(format!(
                "execution_duration:{}:{}:{}",
                query_type, primary_table, optimization_level
            ))
            .or_default();
        observed.count += 1;
        observed.sum += duration_ms;
    }
}
