//! Query performance engine
//!
//! Ties the analyzer, statistics registry, plan cache and suggestion
//! generator together behind one ingestion call, and exposes the three
//! background passes the scheduler drives.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use qlens_analyzer::{
    GeneratorConfig, HeuristicTextAnalyzer, OptimizationSuggestion, SuggestionGenerator,
    TextAnalysis, TextAnalyzer,
};
use qlens_core::{
    EngineConfig, ExecutionPlan, Fingerprint, IndexUsage, MetricsSink, NoopMetrics, QlensError,
    QueryStatistics, Result, SqlExecutionSource, optimization_level, with_timeout,
};
use serde::{Deserialize, Serialize};

use crate::cache::PlanCache;
use crate::registry::{ExecutionSample, QueryRegistry};
use crate::report::OptimizationReport;
use crate::trends::{TrendReport, classify};

/// Label used when a query references no table
const UNKNOWN_TABLE: &str = "unknown";

/// Outcome of one ingestion call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub fingerprint: Fingerprint,
    /// Performance score in `[0, 100]` after this execution was merged
    pub performance_score: f64,
    pub text_analysis: TextAnalysis,
    /// Ranked suggestions for the fingerprint
    pub suggestions: Vec<OptimizationSuggestion>,
    /// Statistics after this call, if the fingerprint is tracked
    pub statistics: Option<QueryStatistics>,
    /// Plan used for plan-based rules, if one was available
    pub plan: Option<ExecutionPlan>,
    /// Partial failures that degraded this result
    pub warnings: Vec<String>,
}

impl AnalysisResult {
    /// Returns true if any part of the analysis was skipped
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Effectiveness of one index as of the last periodic pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEffectiveness {
    pub table: String,
    pub index: String,
    pub scans: u64,
    pub reads: u64,
    /// `scans / reads` clamped to `[0, 1]`
    pub ratio: f64,
}

impl From<&IndexUsage> for IndexEffectiveness {
    fn from(usage: &IndexUsage) -> Self {
        Self {
            table: usage.table.clone(),
            index: usage.index.clone(),
            scans: usage.scans,
            reads: usage.reads,
            ratio: usage.effectiveness(),
        }
    }
}

/// Summary of one periodic pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicSummary {
    pub tracked: usize,
    pub slow: usize,
    pub classified: usize,
    pub system_suggestions: usize,
    /// False when index usage could not be refreshed this pass
    pub index_usage_refreshed: bool,
}

/// Summary of one cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSummary {
    /// Fingerprints whose statistics were evicted
    pub evicted: Vec<Fingerprint>,
    /// Plans dropped with their fingerprint or for capacity
    pub plans_dropped: usize,
}

/// The query performance analysis engine
pub struct QueryPerformanceEngine {
    config: EngineConfig,
    analyzer: Arc<dyn TextAnalyzer>,
    generator: SuggestionGenerator,
    registry: QueryRegistry,
    plan_cache: PlanCache,
    source: Option<Arc<dyn SqlExecutionSource>>,
    metrics: Arc<dyn MetricsSink>,
    trends: RwLock<TrendReport>,
    system_suggestions: RwLock<Vec<OptimizationSuggestion>>,
    index_effectiveness: RwLock<Vec<IndexEffectiveness>>,
    analysis_passes: AtomicU64,
}

impl std::fmt::Debug for QueryPerformanceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPerformanceEngine")
            .field("config", &self.config)
            .field("tracked", &self.registry.len())
            .field("plan_cache", &self.plan_cache.len())
            .field("source", &self.source.as_ref().map(|s| s.name().to_string()))
            .finish_non_exhaustive()
    }
}

impl QueryPerformanceEngine {
    /// Creates an engine; fails with [`QlensError::Configuration`] on invalid config
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            generator: SuggestionGenerator::with_config(GeneratorConfig::from(&config)),
            plan_cache: PlanCache::new(
                config.plan_cache_max_entries,
                config.external_call_timeout(),
            ),
            analyzer: Arc::new(HeuristicTextAnalyzer::new()),
            registry: QueryRegistry::new(),
            source: None,
            metrics: Arc::new(NoopMetrics),
            trends: RwLock::new(TrendReport::default()),
            system_suggestions: RwLock::new(Vec::new()),
            index_effectiveness: RwLock::new(Vec::new()),
            analysis_passes: AtomicU64::new(0),
            config,
        })
    }

    /// Builder method: set the SQL execution source
    pub fn with_source(mut self, source: Arc<dyn SqlExecutionSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Builder method: set the metrics sink
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Builder method: replace the text analyzer
    pub fn with_analyzer(mut self, analyzer: Arc<dyn TextAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &QueryRegistry {
        &self.registry
    }

    pub fn plan_cache(&self) -> &PlanCache {
        &self.plan_cache
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Latest trend classification
    pub fn trends(&self) -> TrendReport {
        self.trends.read().clone()
    }

    /// Latest system-wide suggestions
    pub fn system_suggestions(&self) -> Vec<OptimizationSuggestion> {
        self.system_suggestions.read().clone()
    }

    /// Index effectiveness as of the last successful usage refresh
    pub fn index_effectiveness(&self) -> Vec<IndexEffectiveness> {
        self.index_effectiveness.read().clone()
    }

    /// Number of completed periodic passes
    pub fn analysis_passes(&self) -> u64 {
        self.analysis_passes.load(Ordering::Relaxed)
    }

    /// Analyzes one query and, when a duration is given, records it as an
    /// execution.
    ///
    /// Never fails: analysis panics, plan fetch failures and empty input are
    /// reported through [`AnalysisResult::warnings`]. Without a duration the
    /// call is read-only and suggestions are computed from the existing
    /// statistics (or from an empty record) without being stored.
    #[tracing::instrument(skip_all, fields(fingerprint = tracing::field::Empty))]
    pub async fn analyze_query(
        &self,
        text: &str,
        duration_ms: Option<f64>,
        rows_examined: Option<u64>,
        rows_returned: Option<u64>,
    ) -> AnalysisResult {
        let fingerprint = Fingerprint::of(text);
        tracing::Span::current().record("fingerprint", fingerprint.short());
        let mut warnings = Vec::new();

        if text.trim().is_empty() {
            warnings.push(QlensError::Analysis("empty query text".into()).to_string());
            return AnalysisResult {
                fingerprint,
                performance_score: 0.0,
                text_analysis: TextAnalysis::empty(),
                suggestions: Vec::new(),
                statistics: None,
                plan: None,
                warnings,
            };
        }

        let analysis = self.analyze_text(text, &mut warnings);
        let now = Utc::now();
        let plan = self.plan_for(&fingerprint, text, now, &mut warnings).await;

        let Some(duration_ms) = duration_ms else {
            let statistics = self.registry.statistics(&fingerprint).unwrap_or_else(|| {
                QueryStatistics::new(analysis.query_type, analysis.tables.clone(), now)
            });
            let suggestions = self.generator.generate(&statistics, &analysis, plan.as_ref());
            let tracked = self.registry.contains(&fingerprint);
            return AnalysisResult {
                fingerprint,
                performance_score: statistics.performance_score(),
                text_analysis: analysis,
                suggestions,
                statistics: tracked.then_some(statistics),
                plan,
                warnings,
            };
        };

        let sample = ExecutionSample::new(duration_ms, now)
            .with_rows(rows_examined.unwrap_or(0), rows_returned.unwrap_or(0));
        let slow_threshold = self.config.slow_query_threshold_ms;
        let alert_threshold = self.config.alert_threshold_executions;

        let (statistics, suggestions, alert) =
            self.registry
                .record_with(&fingerprint, text, &analysis, sample, |tracked| {
                    let suggestions =
                        self.generator
                            .generate(&tracked.statistics, &tracked.analysis, plan.as_ref());
                    tracked.suggestions = suggestions.clone();

                    let slow_now = tracked.statistics.is_slow(slow_threshold)
                        && tracked.statistics.execution_count >= alert_threshold;
                    let alert = slow_now && !tracked.slow_alerted;
                    tracked.slow_alerted = slow_now;

                    (tracked.statistics.clone(), suggestions, alert)
                });

        self.plan_cache.touch(&fingerprint, now);
        self.publish_execution(&fingerprint, &statistics, &suggestions, duration_ms, alert);

        AnalysisResult {
            fingerprint,
            performance_score: statistics.performance_score(),
            text_analysis: analysis,
            suggestions,
            statistics: Some(statistics),
            plan,
            warnings,
        }
    }

    /// Pulls a batch of live slow statements from the source and ingests
    /// each of them; returns how many were ingested.
    ///
    /// Each statement is recorded as one execution at its reported mean.
    pub async fn live_monitoring_pass(&self) -> Result<usize> {
        let Some(source) = &self.source else {
            return Ok(0);
        };

        let statements = with_timeout(
            "live statement enumeration",
            self.config.external_call_timeout(),
            source.live_slow_statements(self.config.live_batch_size),
        )
        .await
        .map_err(|e| {
            tracing::warn!(source = source.name(), error = %e, "live statements unavailable");
            e
        })?;

        let mut ingested = 0;
        for statement in statements.into_iter().take(self.config.live_batch_size) {
            if statement.text.trim().is_empty() {
                continue;
            }
            self.analyze_query(&statement.text, Some(statement.mean_duration_ms), None, None)
                .await;
            ingested += 1;
        }

        tracing::debug!(ingested, "live monitoring pass complete");
        Ok(ingested)
    }

    /// Classifies trends, refreshes system-wide suggestions and index
    /// effectiveness.
    ///
    /// Index usage failures keep the previous effectiveness figures and only
    /// clear the unused-index suggestions for this pass.
    pub async fn periodic_analysis_pass(&self) -> Result<PeriodicSummary> {
        let now = Utc::now();
        let slow_threshold = self.config.slow_query_threshold_ms;
        let min_executions = self.config.trend_min_executions;

        let mut tracked = 0;
        let mut slow = 0;
        let mut classifications = Vec::new();
        self.registry.for_each(|entry| {
            tracked += 1;
            if entry.statistics.is_slow(slow_threshold) {
                slow += 1;
            }
            if let Some(bucket) = classify(&entry.statistics, slow_threshold, min_executions) {
                classifications.push((entry.fingerprint.clone(), bucket));
            }
        });
        let trends = TrendReport::from_classifications(now, classifications);
        let classified = trends.total();
        *self.trends.write() = trends;

        let usage = self.fetch_index_usage().await;
        let index_usage_refreshed = usage.is_some();
        let usage = usage.unwrap_or_default();
        if index_usage_refreshed {
            let effectiveness: Vec<IndexEffectiveness> =
                usage.iter().map(IndexEffectiveness::from).collect();
            for index in &effectiveness {
                self.metrics
                    .index_effectiveness(&index.table, &index.index, index.ratio);
            }
            *self.index_effectiveness.write() = effectiveness;
        }

        let system = self.generator.system_wide(tracked, slow, &usage);
        for suggestion in &system {
            self.metrics.suggestion_emitted(
                suggestion.suggestion_type.as_str(),
                suggestion.severity.as_str(),
            );
        }
        let system_suggestions = system.len();
        *self.system_suggestions.write() = system;

        let passes = self.analysis_passes.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            passes,
            tracked,
            slow,
            classified,
            system_suggestions,
            "periodic analysis pass complete"
        );

        Ok(PeriodicSummary {
            tracked,
            slow,
            classified,
            system_suggestions,
            index_usage_refreshed,
        })
    }

    /// Evicts fingerprints idle for longer than the retention window, with
    /// their plans and suggestions, then trims the plan cache to capacity.
    pub fn cleanup_pass(&self, now: DateTime<Utc>) -> CleanupSummary {
        let evicted = self
            .registry
            .evict_idle(now, self.config.stats_retention());

        let mut plans_dropped = 0;
        for fingerprint in &evicted {
            if self.plan_cache.remove(fingerprint).is_some() {
                plans_dropped += 1;
            }
        }
        // Plans fetched for read-only analyses never got a registry entry
        plans_dropped += self.plan_cache.retain(|fp| self.registry.contains(fp));
        plans_dropped += self.plan_cache.trim_to_capacity().len();

        if !evicted.is_empty() || plans_dropped > 0 {
            tracing::info!(
                evicted = evicted.len(),
                plans_dropped,
                remaining = self.registry.len(),
                "cleanup pass evicted stale state"
            );
        } else {
            tracing::debug!(remaining = self.registry.len(), "cleanup pass found nothing to evict");
        }

        CleanupSummary {
            evicted,
            plans_dropped,
        }
    }

    /// Read-only snapshot of all engine state
    pub fn optimization_report(&self) -> OptimizationReport {
        OptimizationReport::build(self)
    }

    fn analyze_text(&self, text: &str, warnings: &mut Vec<String>) -> TextAnalysis {
        let analyzer = Arc::clone(&self.analyzer);
        match std::panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(text))) {
            Ok(analysis) => analysis,
            Err(_) => {
                let err = QlensError::Analysis("text analyzer panicked".into());
                tracing::error!(error = %err, "query text analysis failed");
                warnings.push(err.to_string());
                TextAnalysis::empty()
            }
        }
    }

    async fn plan_for(
        &self,
        fingerprint: &Fingerprint,
        text: &str,
        now: DateTime<Utc>,
        warnings: &mut Vec<String>,
    ) -> Option<ExecutionPlan> {
        if !self.config.enable_plan_caching {
            return None;
        }
        let source = self.source.as_ref()?;

        let last_executed = self.registry.last_executed(fingerprint).unwrap_or(now).max(now);
        let fetched = self
            .plan_cache
            .get_or_fetch(fingerprint, last_executed, || source.fetch_plan(text))
            .await;

        match fetched {
            Ok(plan) => Some(plan),
            Err(QlensError::NotSupported(reason)) => {
                tracing::debug!(source = source.name(), %reason, "plans not available");
                None
            }
            Err(e) => {
                tracing::warn!(source = source.name(), error = %e, "plan fetch skipped");
                warnings.push(e.to_string());
                None
            }
        }
    }

    async fn fetch_index_usage(&self) -> Option<Vec<IndexUsage>> {
        let source = self.source.as_ref()?;
        let fetched = with_timeout(
            "index usage enumeration",
            self.config.external_call_timeout(),
            source.index_usage(),
        )
        .await;

        match fetched {
            Ok(usage) => Some(usage),
            Err(QlensError::NotSupported(reason)) => {
                tracing::debug!(source = source.name(), %reason, "index usage not available");
                None
            }
            Err(e) => {
                tracing::warn!(source = source.name(), error = %e, "index usage refresh skipped");
                None
            }
        }
    }

    fn publish_execution(
        &self,
        fingerprint: &Fingerprint,
        statistics: &QueryStatistics,
        suggestions: &[OptimizationSuggestion],
        duration_ms: f64,
        alert: bool,
    ) {
        let score = statistics.performance_score();
        let table = statistics.primary_table().unwrap_or(UNKNOWN_TABLE);

        self.metrics.performance_score(fingerprint.as_str(), score);
        self.metrics.execution_duration(
            statistics.query_type.as_str(),
            table,
            optimization_level(score),
            duration_ms,
        );
        for suggestion in suggestions {
            self.metrics.suggestion_emitted(
                suggestion.suggestion_type.as_str(),
                suggestion.severity.as_str(),
            );
        }

        if alert {
            tracing::warn!(
                fingerprint = fingerprint.short(),
                avg_ms = statistics.avg_duration_ms(),
                executions = statistics.execution_count,
                "query crossed the slow threshold"
            );
            if statistics.tables.is_empty() {
                self.metrics.slow_query_alert("high", UNKNOWN_TABLE);
            }
            for table in &statistics.tables {
                self.metrics.slow_query_alert("high", table);
            }
        }
    }
}
