//! Per-fingerprint query state
//!
//! Statistics, the latest text analysis and the current suggestion set of a
//! fingerprint live together in one [`TrackedQuery`], stored in a sharded
//! map. Every mutation of one fingerprint happens under that entry's lock, so
//! updates to the same fingerprint are linearizable while different
//! fingerprints only contend when they hash to the same shard.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use qlens_analyzer::{OptimizationSuggestion, TextAnalysis};
use qlens_core::{Fingerprint, QueryStatistics};
use serde::{Deserialize, Serialize};

/// One observed execution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionSample {
    pub duration_ms: f64,
    pub rows_examined: u64,
    pub rows_returned: u64,
    pub at: DateTime<Utc>,
}

impl ExecutionSample {
    pub fn new(duration_ms: f64, at: DateTime<Utc>) -> Self {
        Self {
            duration_ms,
            rows_examined: 0,
            rows_returned: 0,
            at,
        }
    }

    /// Builder method: set row counts
    pub fn with_rows(mut self, rows_examined: u64, rows_returned: u64) -> Self {
        self.rows_examined = rows_examined;
        self.rows_returned = rows_returned;
        self
    }
}

/// Everything known about one fingerprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedQuery {
    pub fingerprint: Fingerprint,
    /// Most recent raw text seen for this fingerprint
    pub sample_query: String,
    pub statistics: QueryStatistics,
    pub analysis: TextAnalysis,
    /// Current ranked suggestions, replaced wholesale on every analysis
    pub suggestions: Vec<OptimizationSuggestion>,
    /// Set while the fingerprint is in the slow state and its alert has fired
    pub slow_alerted: bool,
}

impl TrackedQuery {
    fn new(
        fingerprint: Fingerprint,
        sample_query: &str,
        analysis: &TextAnalysis,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            fingerprint,
            sample_query: sample_query.to_string(),
            statistics: QueryStatistics::new(analysis.query_type, analysis.tables.clone(), at),
            analysis: analysis.clone(),
            suggestions: Vec::new(),
            slow_alerted: false,
        }
    }
}

/// Concurrency-safe store of [`TrackedQuery`] keyed by fingerprint
#[derive(Debug, Default)]
pub struct QueryRegistry {
    entries: DashMap<Fingerprint, TrackedQuery>,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    /// Creates or merges the statistics of `fingerprint`, then runs `then`
    /// on the updated entry before the entry lock is released.
    ///
    /// Callers use `then` to regenerate suggestions so that readers never see
    /// fresh statistics next to a stale suggestion set.
    pub fn record_with<R>(
        &self,
        fingerprint: &Fingerprint,
        query_text: &str,
        analysis: &TextAnalysis,
        sample: ExecutionSample,
        then: impl FnOnce(&mut TrackedQuery) -> R,
    ) -> R {
        let mut entry = self
            .entries
            .entry(fingerprint.clone())
            .or_insert_with(|| {
                TrackedQuery::new(fingerprint.clone(), query_text, analysis, sample.at)
            });

        let tracked = entry.value_mut();
        if sample.at >= tracked.statistics.last_executed {
            tracked.sample_query.clear();
            tracked.sample_query.push_str(query_text);
            tracked.analysis = analysis.clone();
        }
        tracked.statistics.record(
            sample.duration_ms,
            sample.rows_examined,
            sample.rows_returned,
            sample.at,
        );

        then(tracked)
    }

    /// Creates or merges the statistics of `fingerprint` and returns a copy
    pub fn record_execution(
        &self,
        fingerprint: &Fingerprint,
        query_text: &str,
        analysis: &TextAnalysis,
        sample: ExecutionSample,
    ) -> QueryStatistics {
        self.record_with(fingerprint, query_text, analysis, sample, |tracked| {
            tracked.statistics.clone()
        })
    }

    /// Runs `f` on an existing entry under its lock
    pub fn update<R>(
        &self,
        fingerprint: &Fingerprint,
        f: impl FnOnce(&mut TrackedQuery) -> R,
    ) -> Option<R> {
        self.entries
            .get_mut(fingerprint)
            .map(|mut entry| f(entry.value_mut()))
    }

    /// Copy of one entry
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<TrackedQuery> {
        self.entries.get(fingerprint).map(|entry| entry.value().clone())
    }

    pub fn statistics(&self, fingerprint: &Fingerprint) -> Option<QueryStatistics> {
        self.entries
            .get(fingerprint)
            .map(|entry| entry.statistics.clone())
    }

    pub fn suggestions(&self, fingerprint: &Fingerprint) -> Vec<OptimizationSuggestion> {
        self.entries
            .get(fingerprint)
            .map(|entry| entry.suggestions.clone())
            .unwrap_or_default()
    }

    pub fn last_executed(&self, fingerprint: &Fingerprint) -> Option<DateTime<Utc>> {
        self.entries
            .get(fingerprint)
            .map(|entry| entry.statistics.last_executed)
    }

    /// Copies of every entry, sorted by fingerprint.
    ///
    /// Each entry is copied under its own lock; the snapshot as a whole is not
    /// atomic across fingerprints.
    pub fn snapshot(&self) -> Vec<TrackedQuery> {
        let mut entries: Vec<TrackedQuery> =
            self.entries.iter().map(|entry| entry.value().clone()).collect();
        entries.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        entries
    }

    /// Runs `f` on every entry without copying it
    pub fn for_each(&self, mut f: impl FnMut(&TrackedQuery)) {
        for entry in self.entries.iter() {
            f(entry.value());
        }
    }

    pub fn fingerprints(&self) -> Vec<Fingerprint> {
        let mut keys: Vec<Fingerprint> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Number of fingerprints whose average duration exceeds `threshold_ms`
    pub fn count_slow(&self, threshold_ms: f64) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.statistics.is_slow(threshold_ms))
            .count()
    }

    pub fn remove(&self, fingerprint: &Fingerprint) -> Option<TrackedQuery> {
        self.entries.remove(fingerprint).map(|(_, tracked)| tracked)
    }

    /// Removes every entry idle for strictly longer than `retention` and
    /// returns the removed fingerprints in sorted order.
    ///
    /// The idle check is repeated under the entry lock, so an execution
    /// recorded between the scan and the removal keeps the entry alive.
    pub fn evict_idle(&self, now: DateTime<Utc>, retention: chrono::Duration) -> Vec<Fingerprint> {
        let candidates: Vec<Fingerprint> = self
            .entries
            .iter()
            .filter(|entry| entry.statistics.idle_for(now) > retention)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted: Vec<Fingerprint> = candidates
            .into_iter()
            .filter_map(|fingerprint| {
                self.entries
                    .remove_if(&fingerprint, |_, tracked| {
                        tracked.statistics.idle_for(now) > retention
                    })
                    .map(|(key, _)| key)
            })
            .collect();
        evicted.sort();
        evicted
    }
}
