//! Optimization report
//!
//! Built from a snapshot of the registry; each fingerprint is copied under
//! its own entry lock so its statistics and suggestions always agree, while
//! different fingerprints may be read at slightly different moments.

use chrono::{DateTime, Utc};
use qlens_analyzer::{OptimizationSuggestion, suggestion_order};
use qlens_core::{Fingerprint, QueryType};
use serde::{Deserialize, Serialize};

use crate::engine::{IndexEffectiveness, QueryPerformanceEngine};
use crate::trends::TrendReport;

/// Aggregate counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub tracked_queries: usize,
    pub slow_queries: usize,
    /// Per-fingerprint plus system-wide suggestions
    pub total_suggestions: usize,
    pub plan_cache_size: usize,
    pub analysis_passes: u64,
}

/// One fingerprint in the "slowest queries" section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryReportEntry {
    pub fingerprint: Fingerprint,
    pub sample_query: String,
    pub query_type: QueryType,
    pub execution_count: u64,
    pub avg_duration_ms: f64,
    pub max_duration_ms: f64,
    pub performance_score: f64,
    pub is_slow: bool,
}

/// A suggestion and the fingerprint it belongs to; `None` for system-wide ones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSuggestion {
    pub fingerprint: Option<Fingerprint>,
    pub suggestion: OptimizationSuggestion,
}

/// System-wide health figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    /// Mean performance score over tracked fingerprints (100 when none)
    pub mean_performance_score: f64,
    /// `1 - stddev/mean` of the per-fingerprint scores, clamped to `[0, 1]`
    pub score_consistency: f64,
    /// Mean index effectiveness, if index usage has been observed
    pub mean_index_effectiveness: Option<f64>,
}

/// Read-only snapshot of the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub generated_at: DateTime<Utc>,
    pub summary: ReportSummary,
    pub top_queries: Vec<QueryReportEntry>,
    pub top_suggestions: Vec<RankedSuggestion>,
    pub trends: TrendReport,
    pub system_health: SystemHealth,
    pub index_effectiveness: Vec<IndexEffectiveness>,
}

impl OptimizationReport {
    pub(crate) fn build(engine: &QueryPerformanceEngine) -> Self {
        let config = engine.config();
        let slow_threshold = config.slow_query_threshold_ms;
        let tracked = engine.registry().snapshot();
        let system_suggestions = engine.system_suggestions();

        let slow_queries = tracked
            .iter()
            .filter(|t| t.statistics.is_slow(slow_threshold))
            .count();
        let total_suggestions = system_suggestions.len()
            + tracked.iter().map(|t| t.suggestions.len()).sum::<usize>();

        let mut top_queries: Vec<QueryReportEntry> = tracked
            .iter()
            .map(|t| QueryReportEntry {
                fingerprint: t.fingerprint.clone(),
                sample_query: t.sample_query.clone(),
                query_type: t.statistics.query_type,
                execution_count: t.statistics.execution_count,
                avg_duration_ms: t.statistics.avg_duration_ms(),
                max_duration_ms: t.statistics.max_duration_ms,
                performance_score: t.statistics.performance_score(),
                is_slow: t.statistics.is_slow(slow_threshold),
            })
            .collect();
        top_queries.sort_by(|a, b| {
            b.avg_duration_ms
                .total_cmp(&a.avg_duration_ms)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        top_queries.truncate(config.report_top_queries);

        let mut top_suggestions: Vec<RankedSuggestion> = tracked
            .iter()
            .flat_map(|t| {
                t.suggestions.iter().map(|suggestion| RankedSuggestion {
                    fingerprint: Some(t.fingerprint.clone()),
                    suggestion: suggestion.clone(),
                })
            })
            .chain(system_suggestions.into_iter().map(|suggestion| RankedSuggestion {
                fingerprint: None,
                suggestion,
            }))
            .collect();
        // Snapshot order is by fingerprint, so the stable sort stays deterministic
        top_suggestions.sort_by(|a, b| suggestion_order(&a.suggestion, &b.suggestion));
        top_suggestions.truncate(config.report_top_suggestions);

        let scores: Vec<f64> = tracked
            .iter()
            .map(|t| t.statistics.performance_score())
            .collect();
        let index_effectiveness = engine.index_effectiveness();

        Self {
            generated_at: Utc::now(),
            summary: ReportSummary {
                tracked_queries: tracked.len(),
                slow_queries,
                total_suggestions,
                plan_cache_size: engine.plan_cache().len(),
                analysis_passes: engine.analysis_passes(),
            },
            top_queries,
            top_suggestions,
            trends: engine.trends(),
            system_health: SystemHealth {
                mean_performance_score: mean(&scores).unwrap_or(100.0),
                score_consistency: consistency(&scores),
                mean_index_effectiveness: mean(
                    &index_effectiveness.iter().map(|i| i.ratio).collect::<Vec<_>>(),
                ),
            },
            index_effectiveness,
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn consistency(scores: &[f64]) -> f64 {
    if scores.len() <= 1 {
        return 1.0;
    }
    let Some(mean) = mean(scores).filter(|m| *m > 0.0) else {
        return 1.0;
    };
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
    (1.0 - variance.sqrt() / mean).clamp(0.0, 1.0)
}
