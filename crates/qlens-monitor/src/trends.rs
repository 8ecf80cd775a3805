//! Trend classification
//!
//! Recomputed on every periodic pass from running statistics; never persisted.
//! The thresholds are fixed ratios of recent-vs-mean duration and of the
//! coefficient of variation, not statistical tests.

use chrono::{DateTime, Utc};
use qlens_core::{Fingerprint, QueryStatistics};
use serde::{Deserialize, Serialize};

/// Recent average above this multiple of the mean means degrading
const DEGRADING_RATIO: f64 = 1.2;
/// Recent average below this multiple of the mean means improving
const IMPROVING_RATIO: f64 = 0.8;
/// Slow fingerprints with a CV at or below this are consistently slow
const CONSISTENT_CV: f64 = 0.5;
/// CV above this means high variance
const HIGH_VARIANCE_CV: f64 = 1.0;

/// Trend bucket of one fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrendBucket {
    Degrading,
    Improving,
    ConsistentlySlow,
    HighVariance,
}

impl TrendBucket {
    pub const ALL: [TrendBucket; 4] = [
        Self::Degrading,
        Self::Improving,
        Self::ConsistentlySlow,
        Self::HighVariance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Degrading => "degrading",
            Self::Improving => "improving",
            Self::ConsistentlySlow => "consistently-slow",
            Self::HighVariance => "high-variance",
        }
    }
}

impl std::fmt::Display for TrendBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assigns a fingerprint to at most one bucket.
///
/// Precedence is degrading, improving, consistently slow, high variance.
/// Fingerprints with fewer than `min_executions` samples are not classified.
pub fn classify(
    stats: &QueryStatistics,
    slow_threshold_ms: f64,
    min_executions: u64,
) -> Option<TrendBucket> {
    if stats.execution_count < min_executions.max(1) {
        return None;
    }

    let mean = stats.avg_duration_ms();
    let cv = stats.coefficient_of_variation();

    if mean > 0.0 && stats.recent_avg_ms > DEGRADING_RATIO * mean {
        Some(TrendBucket::Degrading)
    } else if mean > 0.0 && stats.recent_avg_ms < IMPROVING_RATIO * mean {
        Some(TrendBucket::Improving)
    } else if stats.is_slow(slow_threshold_ms) && cv <= CONSISTENT_CV {
        Some(TrendBucket::ConsistentlySlow)
    } else if cv > HIGH_VARIANCE_CV {
        Some(TrendBucket::HighVariance)
    } else {
        None
    }
}

/// Latest classification of every tracked fingerprint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub generated_at: Option<DateTime<Utc>>,
    pub degrading: Vec<Fingerprint>,
    pub improving: Vec<Fingerprint>,
    pub consistently_slow: Vec<Fingerprint>,
    pub high_variance: Vec<Fingerprint>,
}

impl TrendReport {
    /// Builds a report from `(fingerprint, bucket)` pairs; buckets are sorted
    pub fn from_classifications(
        generated_at: DateTime<Utc>,
        classifications: impl IntoIterator<Item = (Fingerprint, TrendBucket)>,
    ) -> Self {
        let mut report = Self {
            generated_at: Some(generated_at),
            ..Self::default()
        };
        for (fingerprint, bucket) in classifications {
            report.bucket_mut(bucket).push(fingerprint);
        }
        for bucket in TrendBucket::ALL {
            report.bucket_mut(bucket).sort();
        }
        report
    }

    pub fn bucket(&self, bucket: TrendBucket) -> &[Fingerprint] {
        match bucket {
            TrendBucket::Degrading => &self.degrading,
            TrendBucket::Improving => &self.improving,
            TrendBucket::ConsistentlySlow => &self.consistently_slow,
            TrendBucket::HighVariance => &self.high_variance,
        }
    }

    fn bucket_mut(&mut self, bucket: TrendBucket) -> &mut Vec<Fingerprint> {
        match bucket {
            TrendBucket::Degrading => &mut self.degrading,
            TrendBucket::Improving => &mut self.improving,
            TrendBucket::ConsistentlySlow => &mut self.consistently_slow,
            TrendBucket::HighVariance => &mut self.high_variance,
        }
    }

    /// Number of classified fingerprints
    pub fn total(&self) -> usize {
        TrendBucket::ALL.iter().map(|b| self.bucket(*b).len()).sum()
    }

    /// Bucket of `fingerprint`, if it was classified
    pub fn bucket_of(&self, fingerprint: &Fingerprint) -> Option<TrendBucket> {
        TrendBucket::ALL
            .into_iter()
            .find(|bucket| self.bucket(*bucket).contains(fingerprint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use qlens_core::QueryType;
    use std::collections::BTreeSet;

    fn stats_from(durations: &[f64]) -> QueryStatistics {
        let now = Utc::now();
        let mut stats = QueryStatistics::new(QueryType::Select, BTreeSet::new(), now);
        for d in durations {
            stats.record(*d, 0, 0, now);
        }
        stats
    }

    #[test]
    fn test_too_few_samples() {
        let stats = stats_from(&[10.0, 10.0, 500.0]);
        assert_eq!(classify(&stats, 1000.0, 5), None);
    }

    #[test]
    fn test_degrading() {
        let stats = stats_from(&[10.0, 10.0, 10.0, 10.0, 10.0, 100.0, 100.0, 100.0]);
        assert_eq!(classify(&stats, 1000.0, 5), Some(TrendBucket::Degrading));
    }

    #[test]
    fn test_improving() {
        let stats = stats_from(&[100.0, 100.0, 100.0, 100.0, 100.0, 10.0, 10.0, 10.0, 10.0]);
        assert_eq!(classify(&stats, 1000.0, 5), Some(TrendBucket::Improving));
    }

    #[test]
    fn test_consistently_slow() {
        let stats = stats_from(&[1500.0, 1510.0, 1490.0, 1500.0, 1505.0, 1495.0]);
        assert_eq!(classify(&stats, 1000.0, 5), Some(TrendBucket::ConsistentlySlow));
    }

    #[test]
    fn test_high_variance() {
        let stats = stats_from(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 400.0, 1.0, 1.0]);
        assert!(stats.coefficient_of_variation() > 1.0);
        assert_eq!(classify(&stats, 1000.0, 5), Some(TrendBucket::HighVariance));
    }

    #[test]
    fn test_slow_query_with_spikes_is_high_variance() {
        let stats = stats_from(&[
            100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 10000.0, 100.0, 100.0,
        ]);
        assert!(stats.is_slow(1000.0));
        assert_eq!(classify(&stats, 1000.0, 5), Some(TrendBucket::HighVariance));
    }

    #[test]
    fn test_degrading_takes_precedence_over_variance() {
        let stats = stats_from(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 400.0]);
        assert!(stats.coefficient_of_variation() > 1.0);
        assert_eq!(classify(&stats, 1000.0, 5), Some(TrendBucket::Degrading));
    }

    #[test]
    fn test_stable_fast_query_is_unclassified() {
        let stats = stats_from(&[10.0; 20]);
        assert_eq!(classify(&stats, 1000.0, 5), None);
    }

    #[test]
    fn test_report_buckets() {
        let a = Fingerprint::of("select 1 from a");
        let b = Fingerprint::of("select 1 from b");
        let c = Fingerprint::of("select 1 from c");
        let report = TrendReport::from_classifications(
            Utc::now(),
            [
                (a, TrendBucket::Degrading),
                (b.clone(), TrendBucket::HighVariance),
                (c, TrendBucket::Degrading),
            ],
        );

        assert_eq!(report.total(), 3);
        assert_eq!(report.degrading.len(), 2);
        assert!(report.degrading.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(report.bucket_of(&b), Some(TrendBucket::HighVariance));
        assert_eq!(report.bucket_of(&Fingerprint::of("select 1 from z")), None);
    }

    #[test]
    fn test_bucket_names() {
        assert_eq!(TrendBucket::ConsistentlySlow.to_string(), "consistently-slow");
    }
}
