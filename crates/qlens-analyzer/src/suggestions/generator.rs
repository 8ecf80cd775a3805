//! Suggestion Generator
//!
//! Turns per-fingerprint statistics, text analysis and (optionally) an
//! execution plan into a ranked list of advisory suggestions. Every rule
//! family runs independently and several may fire for the same query.
//! Output is deterministic for identical inputs.

use std::cmp::Ordering;

use qlens_core::{EngineConfig, ExecutionPlan, IndexUsage, QueryStatistics, QueryType};
use serde::{Deserialize, Serialize};

use super::suggestion::{ImplementationCost, OptimizationSuggestion, Severity, SuggestionType};
use crate::text::{AntiPattern, TextAnalysis};

/// Share of the average duration an index on a slow query is expected to save
const SLOW_INDEX_IMPROVEMENT: f64 = 0.7;
/// Share of the average duration a rewrite of a complex slow query is expected to save
const SLOW_REWRITE_IMPROVEMENT: f64 = 0.3;
/// Complexity above which slow queries also get a rewrite suggestion
const REWRITE_COMPLEXITY_THRESHOLD: f64 = 50.0;
/// Executions required before duration spread is trusted
const UNSTABLE_PLAN_MIN_EXECUTIONS: u64 = 100;
/// Std-dev / mean ratio above which plans are considered unstable
const UNSTABLE_PLAN_SPREAD: f64 = 0.5;
/// Fraction of slow fingerprints that triggers a global statistics refresh
const SYSTEM_SLOW_FRACTION: f64 = 0.1;
/// Fraction of slow fingerprints that escalates the refresh to critical
const SYSTEM_SLOW_CRITICAL_FRACTION: f64 = 0.5;

/// Thresholds used by the rule families
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Average duration (ms) above which a query is slow
    pub slow_query_threshold_ms: f64,
    /// Rows examined per execution above which table-level rules fire
    pub high_row_scan_threshold: u64,
    /// Executions required before slow-query rules fire
    pub alert_threshold_executions: u64,
    /// Maximum suggestions kept per query
    pub max_suggestions_per_query: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for GeneratorConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            slow_query_threshold_ms: config.slow_query_threshold_ms,
            high_row_scan_threshold: config.high_row_scan_threshold,
            alert_threshold_executions: config.alert_threshold_executions,
            max_suggestions_per_query: config.max_suggestions_per_query,
        }
    }
}

impl GeneratorConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the slow query threshold
    pub fn with_slow_query_threshold_ms(mut self, threshold_ms: f64) -> Self {
        self.slow_query_threshold_ms = threshold_ms;
        self
    }

    /// Sets the high row scan threshold
    pub fn with_high_row_scan_threshold(mut self, rows: u64) -> Self {
        self.high_row_scan_threshold = rows;
        self
    }

    /// Sets the execution count required for slow-query rules
    pub fn with_alert_threshold_executions(mut self, executions: u64) -> Self {
        self.alert_threshold_executions = executions;
        self
    }

    /// Sets the per-query suggestion limit
    pub fn with_max_suggestions_per_query(mut self, max: usize) -> Self {
        self.max_suggestions_per_query = max;
        self
    }
}

/// Rule-based suggestion generator
#[derive(Debug, Clone, Default)]
pub struct SuggestionGenerator {
    config: GeneratorConfig,
}

impl SuggestionGenerator {
    /// Creates a new generator with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new generator with custom config
    pub fn with_config(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Returns the generator config
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Produces the ranked, truncated suggestion list for one fingerprint
    pub fn generate(
        &self,
        stats: &QueryStatistics,
        analysis: &TextAnalysis,
        plan: Option<&ExecutionPlan>,
    ) -> Vec<OptimizationSuggestion> {
        let mut suggestions = Vec::new();

        self.check_slow_query(stats, analysis, &mut suggestions);
        self.check_predicate_indexes(analysis, &mut suggestions);
        self.check_rewrites(analysis, &mut suggestions);
        self.check_table_level(stats, &mut suggestions);
        if let Some(plan) = plan {
            self.check_plan(stats, plan, &mut suggestions);
        }

        rank_suggestions(suggestions, self.config.max_suggestions_per_query)
    }

    /// Suggestions about the system as a whole rather than one query.
    ///
    /// `tracked` and `slow` are fingerprint counts; `index_usage` may be empty
    /// when no usage source is available.
    pub fn system_wide(
        &self,
        tracked: usize,
        slow: usize,
        index_usage: &[IndexUsage],
    ) -> Vec<OptimizationSuggestion> {
        let mut suggestions = Vec::new();

        if tracked > 0 {
            let slow_fraction = slow as f64 / tracked as f64;
            if slow_fraction > SYSTEM_SLOW_FRACTION {
                let severity = if slow_fraction > SYSTEM_SLOW_CRITICAL_FRACTION {
                    Severity::Critical
                } else {
                    Severity::High
                };
                suggestions.push(
                    OptimizationSuggestion::new(
                        SuggestionType::UpdateStatistics,
                        severity,
                        ImplementationCost::Low,
                        format!(
                            "{} of {} tracked queries are slow ({:.0}%)",
                            slow,
                            tracked,
                            slow_fraction * 100.0
                        ),
                    )
                    .with_hint("Refresh planner statistics on all frequently queried tables"),
                );
            }
        }

        for usage in index_usage.iter().filter(|u| u.is_unused()) {
            suggestions.push(
                OptimizationSuggestion::new(
                    SuggestionType::DropIndex,
                    Severity::Low,
                    ImplementationCost::Low,
                    format!("Index {} on {} has never been scanned", usage.index, usage.table),
                )
                .with_table(usage.table.clone())
                .with_hint(format!(
                    "Review whether index {} is still needed before dropping it",
                    usage.index
                )),
            );
        }

        rank_suggestions(suggestions, usize::MAX)
    }

    fn check_slow_query(
        &self,
        stats: &QueryStatistics,
        analysis: &TextAnalysis,
        suggestions: &mut Vec<OptimizationSuggestion>,
    ) {
        if !stats.is_slow(self.config.slow_query_threshold_ms)
            || stats.execution_count < self.config.alert_threshold_executions
        {
            return;
        }

        let avg = stats.avg_duration_ms();
        for table in &stats.tables {
            suggestions.push(
                OptimizationSuggestion::new(
                    SuggestionType::AddIndex,
                    Severity::High,
                    ImplementationCost::Medium,
                    format!(
                        "Slow query on {} averages {:.0}ms over {} executions",
                        table, avg, stats.execution_count
                    ),
                )
                .with_table(table.clone())
                .with_estimated_improvement_ms(avg * SLOW_INDEX_IMPROVEMENT)
                .with_hint(format!(
                    "Index the columns {} is filtered and joined on",
                    table
                )),
            );
        }

        if analysis.complexity_score > REWRITE_COMPLEXITY_THRESHOLD {
            suggestions.push(
                OptimizationSuggestion::new(
                    SuggestionType::RewriteQuery,
                    Severity::Medium,
                    ImplementationCost::High,
                    format!(
                        "Slow query has high structural complexity ({:.0})",
                        analysis.complexity_score
                    ),
                )
                .with_estimated_improvement_ms(avg * SLOW_REWRITE_IMPROVEMENT)
                .with_hint("Break the query up or replace subqueries with joins"),
            );
        }
    }

    fn check_predicate_indexes(
        &self,
        analysis: &TextAnalysis,
        suggestions: &mut Vec<OptimizationSuggestion>,
    ) {
        if analysis.query_type != QueryType::Select {
            return;
        }

        for (table, columns) in analysis.columns_by_table() {
            let column_list = columns.join(", ");
            let suggestion = if columns.len() == 1 {
                OptimizationSuggestion::new(
                    SuggestionType::AddIndex,
                    Severity::Medium,
                    ImplementationCost::Low,
                    format!("Predicate on {}.{} may benefit from an index", table, column_list),
                )
            } else {
                OptimizationSuggestion::new(
                    SuggestionType::AddIndex,
                    Severity::High,
                    ImplementationCost::Medium,
                    format!(
                        "Predicates on {} ({}) may benefit from a composite index",
                        table, column_list
                    ),
                )
            };

            suggestions.push(
                suggestion
                    .with_hint(format!("CREATE INDEX ON {} ({})", table, column_list))
                    .with_table(table)
                    .with_columns(columns),
            );
        }
    }

    fn check_rewrites(
        &self,
        analysis: &TextAnalysis,
        suggestions: &mut Vec<OptimizationSuggestion>,
    ) {
        if analysis.has(AntiPattern::SelectStar) {
            suggestions.push(
                OptimizationSuggestion::new(
                    SuggestionType::ModifyQuery,
                    Severity::Low,
                    ImplementationCost::Low,
                    "Query selects every column",
                )
                .with_hint("List only the columns the caller needs"),
            );
        }

        if analysis.has(AntiPattern::OrConditions) {
            suggestions.push(
                OptimizationSuggestion::new(
                    SuggestionType::RewriteQuery,
                    Severity::Medium,
                    ImplementationCost::Medium,
                    "OR conditions in WHERE can prevent index usage",
                )
                .with_hint("Rewrite the OR branches as a UNION of indexed lookups"),
            );
        }

        if analysis.has(AntiPattern::FunctionInWhere) {
            suggestions.push(
                OptimizationSuggestion::new(
                    SuggestionType::ModifyQuery,
                    Severity::High,
                    ImplementationCost::Medium,
                    "Function applied to a column in WHERE defeats index usage",
                )
                .with_hint("Compare the bare column, or index the expression itself"),
            );
        }
    }

    fn check_table_level(
        &self,
        stats: &QueryStatistics,
        suggestions: &mut Vec<OptimizationSuggestion>,
    ) {
        let avg_rows = stats.avg_rows_examined();
        if avg_rows > self.config.high_row_scan_threshold as f64 {
            for table in &stats.tables {
                suggestions.push(
                    OptimizationSuggestion::new(
                        SuggestionType::PartitionTable,
                        Severity::Medium,
                        ImplementationCost::High,
                        format!(
                            "Queries on {} examine {:.0} rows per execution",
                            table, avg_rows
                        ),
                    )
                    .with_table(table.clone())
                    .with_hint(format!(
                        "Partition {} on the column most queries filter by",
                        table
                    )),
                );
            }
        }

        let mean = stats.avg_duration_ms();
        if stats.execution_count > UNSTABLE_PLAN_MIN_EXECUTIONS
            && stats.std_dev_ms() > UNSTABLE_PLAN_SPREAD * mean
        {
            let mut suggestion = OptimizationSuggestion::new(
                SuggestionType::UpdateStatistics,
                Severity::Low,
                ImplementationCost::Low,
                format!(
                    "Execution time varies widely (mean {:.0}ms, std dev {:.0}ms)",
                    mean,
                    stats.std_dev_ms()
                ),
            )
            .with_hint("Refresh statistics so the planner picks a stable plan");
            if let Some(table) = stats.primary_table() {
                suggestion = suggestion.with_table(table);
            }
            suggestions.push(suggestion);
        }
    }

    fn check_plan(
        &self,
        stats: &QueryStatistics,
        plan: &ExecutionPlan,
        suggestions: &mut Vec<OptimizationSuggestion>,
    ) {
        if !plan.has_full_scan() || plan.estimated_rows <= self.config.high_row_scan_threshold {
            return;
        }

        for table in &stats.tables {
            suggestions.push(
                OptimizationSuggestion::new(
                    SuggestionType::AddIndex,
                    Severity::High,
                    ImplementationCost::Medium,
                    format!(
                        "Plan scans {} in full (estimated {} rows)",
                        table, plan.estimated_rows
                    ),
                )
                .with_table(table.clone())
                .with_hint(format!(
                    "Estimated cost {:.1}; an index on the filter columns avoids the scan",
                    plan.estimated_cost
                )),
            );
        }
    }
}

/// Ranking order: severity descending, then estimated improvement descending
pub fn suggestion_order(a: &OptimizationSuggestion, b: &OptimizationSuggestion) -> Ordering {
    b.severity.ordinal().cmp(&a.severity.ordinal()).then_with(|| {
        b.improvement_for_ranking()
            .total_cmp(&a.improvement_for_ranking())
    })
}

/// Stable sort by [`suggestion_order`], truncated to `limit`
pub fn rank_suggestions(
    mut suggestions: Vec<OptimizationSuggestion>,
    limit: usize,
) -> Vec<OptimizationSuggestion> {
    suggestions.sort_by(suggestion_order);
    suggestions.truncate(limit);
    suggestions
}

#[cfg(test)]
mod tests;
