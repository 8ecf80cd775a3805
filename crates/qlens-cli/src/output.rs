//! Terminal rendering of analysis results and reports

use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use qlens_analyzer::OptimizationSuggestion;
use qlens_monitor::{AnalysisResult, OptimizationReport, TrendBucket};

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

fn improvement(suggestion: &OptimizationSuggestion) -> String {
    suggestion
        .estimated_improvement_ms
        .map(|ms| format!("{:.0}ms", ms))
        .unwrap_or_else(|| "-".to_string())
}

fn suggestion_table<'a>(
    rows: impl IntoIterator<Item = (String, &'a OptimizationSuggestion)>,
) -> Table {
    let mut out = table(&["Scope", "Type", "Severity", "Cost", "Improvement", "Message"]);
    for (scope, suggestion) in rows {
        let mut message = suggestion.message.clone();
        if let Some(hint) = &suggestion.hint {
            message.push('\n');
            message.push_str(hint);
        }
        out.add_row(vec![
            scope,
            suggestion.suggestion_type.to_string(),
            suggestion.severity.to_string(),
            suggestion.cost.as_str().to_string(),
            improvement(suggestion),
            message,
        ]);
    }
    out
}

pub fn render_analysis(result: &AnalysisResult) -> String {
    let analysis = &result.text_analysis;
    let mut out = table(&["Property", "Value"]);
    out.add_row(vec!["Fingerprint".to_string(), result.fingerprint.short().to_string()]);
    out.add_row(vec!["Type".to_string(), analysis.query_type.as_str().to_string()]);
    out.add_row(vec![
        "Tables".to_string(),
        analysis.tables.iter().cloned().collect::<Vec<_>>().join(", "),
    ]);
    out.add_row(vec!["Complexity".to_string(), format!("{:.1}", analysis.complexity_score)]);
    out.add_row(vec![
        "Selectivity".to_string(),
        format!("{:.4}", analysis.selectivity_estimate),
    ]);
    out.add_row(vec![
        "Anti-patterns".to_string(),
        analysis
            .anti_patterns
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    ]);
    out.add_row(vec![
        "Performance score".to_string(),
        format!("{:.1}", result.performance_score),
    ]);

    let mut rendered = out.to_string();
    if !result.suggestions.is_empty() {
        let rows = result
            .suggestions
            .iter()
            .map(|s| (s.table.clone().unwrap_or_else(|| "-".to_string()), s));
        rendered.push_str("\n\nSuggestions\n");
        rendered.push_str(&suggestion_table(rows).to_string());
    }
    for warning in &result.warnings {
        rendered.push_str(&format!("\nwarning: {}", warning));
    }
    rendered
}

pub fn render_report(report: &OptimizationReport) -> String {
    let summary = &report.summary;
    let health = &report.system_health;

    let mut overview = table(&["Metric", "Value"]);
    for (name, value) in [
        ("Tracked queries", summary.tracked_queries.to_string()),
        ("Slow queries", summary.slow_queries.to_string()),
        ("Suggestions", summary.total_suggestions.to_string()),
        ("Cached plans", summary.plan_cache_size.to_string()),
        ("Analysis passes", summary.analysis_passes.to_string()),
        ("Mean score", format!("{:.1}", health.mean_performance_score)),
        ("Score consistency", format!("{:.2}", health.score_consistency)),
        (
            "Index effectiveness",
            health
                .mean_index_effectiveness
                .map(|v| format!("{:.2}", v))
                .unwrap_or_else(|| "-".to_string()),
        ),
    ] {
        overview.add_row(vec![name.to_string(), value]);
    }

    let mut queries = table(&["Fingerprint", "Executions", "Avg ms", "Max ms", "Score", "Query"]);
    for entry in &report.top_queries {
        queries.add_row(vec![
            format!("{}{}", entry.fingerprint.short(), if entry.is_slow { " (slow)" } else { "" }),
            entry.execution_count.to_string(),
            format!("{:.1}", entry.avg_duration_ms),
            format!("{:.1}", entry.max_duration_ms),
            format!("{:.1}", entry.performance_score),
            entry.sample_query.clone(),
        ]);
    }

    let suggestions = suggestion_table(report.top_suggestions.iter().map(|ranked| {
        let scope = ranked
            .fingerprint
            .as_ref()
            .map(|fp| fp.short().to_string())
            .unwrap_or_else(|| "system".to_string());
        (scope, &ranked.suggestion)
    }));

    let mut trends = table(&["Trend", "Fingerprints"]);
    for bucket in TrendBucket::ALL {
        let fingerprints = report.trends.bucket(bucket);
        if fingerprints.is_empty() {
            continue;
        }
        trends.add_row(vec![
            bucket.to_string(),
            fingerprints
                .iter()
                .map(|fp| fp.short())
                .collect::<Vec<_>>()
                .join(", "),
        ]);
    }

    format!(
        "Overview\n{}\n\nSlowest queries\n{}\n\nTop suggestions\n{}\n\nTrends\n{}",
        overview, queries, suggestions, trends
    )
}
