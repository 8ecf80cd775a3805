//! Per-fingerprint running execution statistics

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::QueryType;

/// Smoothing factor for the recent-duration moving average
const RECENT_AVG_ALPHA: f64 = 0.2;

/// Running aggregates for one query fingerprint.
///
/// Mean and variance are maintained with Welford's online algorithm so that
/// long-lived fingerprints with millions of executions stay accurate. The
/// cumulative totals only ever grow; the whole record is dropped on eviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryStatistics {
    /// Number of recorded executions
    pub execution_count: u64,
    /// Sum of all recorded durations (ms)
    pub total_duration_ms: f64,
    /// Fastest recorded execution (ms)
    pub min_duration_ms: f64,
    /// Slowest recorded execution (ms)
    pub max_duration_ms: f64,
    /// Running mean (ms)
    mean_duration_ms: f64,
    /// Sum of squared deviations from the running mean
    m2: f64,
    /// Exponentially weighted average favouring recent executions (ms)
    pub recent_avg_ms: f64,
    /// Cumulative rows examined
    pub total_rows_examined: u64,
    /// Cumulative rows returned
    pub total_rows_returned: u64,
    /// First time this fingerprint was seen
    pub first_seen: DateTime<Utc>,
    /// Most recent execution time
    pub last_executed: DateTime<Utc>,
    /// Statement category
    pub query_type: QueryType,
    /// Tables referenced by the statement
    pub tables: BTreeSet<String>,
}

impl QueryStatistics {
    /// Creates an empty record; the first [`record`](Self::record) populates it
    pub fn new(query_type: QueryType, tables: BTreeSet<String>, at: DateTime<Utc>) -> Self {
        Self {
            execution_count: 0,
            total_duration_ms: 0.0,
            min_duration_ms: 0.0,
            max_duration_ms: 0.0,
            mean_duration_ms: 0.0,
            m2: 0.0,
            recent_avg_ms: 0.0,
            total_rows_examined: 0,
            total_rows_returned: 0,
            first_seen: at,
            last_executed: at,
            query_type,
            tables,
        }
    }

    /// Merges one execution into the aggregates
    pub fn record(
        &mut self,
        duration_ms: f64,
        rows_examined: u64,
        rows_returned: u64,
        at: DateTime<Utc>,
    ) {
        let duration_ms = if duration_ms.is_finite() {
            duration_ms.max(0.0)
        } else {
            0.0
        };

        if self.execution_count == 0 {
            self.min_duration_ms = duration_ms;
            self.max_duration_ms = duration_ms;
            self.recent_avg_ms = duration_ms;
        } else {
            self.min_duration_ms = self.min_duration_ms.min(duration_ms);
            self.max_duration_ms = self.max_duration_ms.max(duration_ms);
            self.recent_avg_ms =
                RECENT_AVG_ALPHA * duration_ms + (1.0 - RECENT_AVG_ALPHA) * self.recent_avg_ms;
        }

        self.execution_count += 1;
        self.total_duration_ms += duration_ms;

        let delta = duration_ms - self.mean_duration_ms;
        self.mean_duration_ms += delta / self.execution_count as f64;
        self.m2 += delta * (duration_ms - self.mean_duration_ms);

        self.total_rows_examined = self.total_rows_examined.saturating_add(rows_examined);
        self.total_rows_returned = self.total_rows_returned.saturating_add(rows_returned);

        if at > self.last_executed {
            self.last_executed = at;
        }
    }

    /// Mean execution duration (ms)
    pub fn avg_duration_ms(&self) -> f64 {
        if self.execution_count == 0 {
            0.0
        } else {
            self.mean_duration_ms
        }
    }

    /// Population variance of execution durations
    pub fn variance(&self) -> f64 {
        if self.execution_count < 2 {
            0.0
        } else {
            (self.m2 / self.execution_count as f64).max(0.0)
        }
    }

    /// Population standard deviation of execution durations (ms)
    pub fn std_dev_ms(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Standard deviation relative to the mean (0 when the mean is 0)
    pub fn coefficient_of_variation(&self) -> f64 {
        let mean = self.avg_duration_ms();
        if mean <= 0.0 {
            0.0
        } else {
            self.std_dev_ms() / mean
        }
    }

    /// Average rows examined per execution
    pub fn avg_rows_examined(&self) -> f64 {
        if self.execution_count == 0 {
            0.0
        } else {
            self.total_rows_examined as f64 / self.execution_count as f64
        }
    }

    /// Returns true if the average duration exceeds `threshold_ms`
    pub fn is_slow(&self, threshold_ms: f64) -> bool {
        self.execution_count > 0 && self.avg_duration_ms() > threshold_ms
    }

    /// Performance score in `[0, 100]`, higher is better.
    ///
    /// `time * consistency * efficiency`, where time drops by one point per
    /// 10ms of average duration, consistency is `1 - cv` bounded to
    /// `[0.5, 1.0]` and efficiency is the returned/examined row ratio.
    pub fn performance_score(&self) -> f64 {
        let time_score = (100.0 - self.avg_duration_ms() / 10.0).clamp(0.0, 100.0);

        let consistency = if self.execution_count > 1 {
            (1.0 - self.coefficient_of_variation()).clamp(0.5, 1.0)
        } else {
            1.0
        };

        let efficiency = if self.total_rows_examined > 0 {
            (self.total_rows_returned as f64 / self.total_rows_examined as f64).clamp(0.0, 1.0)
        } else {
            1.0
        };

        (time_score * consistency * efficiency).clamp(0.0, 100.0)
    }

    /// The first referenced table in name order, if any
    pub fn primary_table(&self) -> Option<&str> {
        self.tables.iter().next().map(String::as_str)
    }

    /// Age of the last execution relative to `now`
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_executed
    }
}
