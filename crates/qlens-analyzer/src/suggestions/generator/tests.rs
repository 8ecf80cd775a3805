//! Tests for the Suggestion Generator

use super::*;
use crate::text::analyze_text;
use chrono::Utc;

fn stats_with(
    tables: &[&str],
    durations: impl IntoIterator<Item = f64>,
    rows_examined: u64,
) -> QueryStatistics {
    let now = Utc::now();
    let mut stats = QueryStatistics::new(
        QueryType::Select,
        tables.iter().map(|t| t.to_string()).collect(),
        now,
    );
    for duration in durations {
        stats.record(duration, rows_examined, 0, now);
    }
    stats
}

fn kinds(suggestions: &[OptimizationSuggestion]) -> Vec<(SuggestionType, Severity)> {
    suggestions
        .iter()
        .map(|s| (s.suggestion_type, s.severity))
        .collect()
}

mod severity_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ordinal() {
        assert_eq!(Severity::Critical.ordinal(), 4);
        assert_eq!(Severity::High.ordinal(), 3);
        assert_eq!(Severity::Medium.ordinal(), 2);
        assert_eq!(Severity::Low.ordinal(), 1);
        assert!(Severity::Critical > Severity::Low);
    }

    #[test]
    fn test_is_high_or_above() {
        assert!(Severity::Critical.is_high_or_above());
        assert!(Severity::High.is_high_or_above());
        assert!(!Severity::Medium.is_high_or_above());
    }

    #[test]
    fn test_serialization() {
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
        assert_eq!(
            serde_json::to_string(&SuggestionType::UpdateStatistics).unwrap(),
            "\"update-statistics\""
        );
        let parsed: SuggestionType = serde_json::from_str("\"add-index\"").unwrap();
        assert_eq!(parsed, SuggestionType::AddIndex);
    }

    #[test]
    fn test_negative_improvement_is_dropped() {
        let s = OptimizationSuggestion::new(
            SuggestionType::AddIndex,
            Severity::Low,
            ImplementationCost::Low,
            "x",
        )
        .with_estimated_improvement_ms(-3.0);
        assert_eq!(s.estimated_improvement_ms, None);
        assert_eq!(s.improvement_for_ranking(), 0.0);
    }
}

// ============================================================================
// Rule families
// ============================================================================

mod slow_query_rule_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_slow_query_adds_index_per_table() {
        let stats = stats_with(&["orders", "customers"], [1500.0; 12], 0);
        let analysis =
            analyze_text("select o.id from orders o join customers c on c.id = o.customer_id");

        let suggestions = SuggestionGenerator::new().generate(&stats, &analysis, None);

        assert!(stats.is_slow(1000.0));
        assert_eq!(
            kinds(&suggestions),
            vec![
                (SuggestionType::AddIndex, Severity::High),
                (SuggestionType::AddIndex, Severity::High),
            ]
        );
        let tables: Vec<_> = suggestions.iter().filter_map(|s| s.table.as_deref()).collect();
        assert_eq!(tables, vec!["customers", "orders"]);
        for s in &suggestions {
            let improvement = s.estimated_improvement_ms.unwrap();
            assert!((improvement - 1050.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_slow_query_waits_for_alert_threshold() {
        let stats = stats_with(&["orders"], [1500.0; 9], 0);
        let suggestions =
            SuggestionGenerator::new().generate(&stats, &TextAnalysis::empty(), None);
        assert!(suggestions.is_empty());
    }

    #[test]
    fn test_complex_slow_query_gets_rewrite() {
        let stats = stats_with(&["orders"], [1500.0; 10], 0);
        let analysis = TextAnalysis {
            complexity_score: 60.0,
            ..TextAnalysis::empty()
        };

        let suggestions = SuggestionGenerator::new().generate(&stats, &analysis, None);

        assert_eq!(
            kinds(&suggestions),
            vec![
                (SuggestionType::AddIndex, Severity::High),
                (SuggestionType::RewriteQuery, Severity::Medium),
            ]
        );
        let rewrite = suggestions[1].estimated_improvement_ms.unwrap();
        assert!((rewrite - 450.0).abs() < 1e-6);
    }
}

mod index_rule_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_column_index() {
        let stats = stats_with(&["users"], [5.0], 1);
        let analysis = analyze_text("select id from users where email = 'a@b.c'");

        let suggestions = SuggestionGenerator::new().generate(&stats, &analysis, None);

        assert_eq!(suggestions.len(), 1);
        let s = &suggestions[0];
        assert_eq!(s.suggestion_type, SuggestionType::AddIndex);
        assert_eq!(s.severity, Severity::Medium);
        assert_eq!(s.cost, ImplementationCost::Low);
        assert_eq!(s.table.as_deref(), Some("users"));
        assert_eq!(s.columns, vec!["email".to_string()]);
    }

    #[test]
    fn test_composite_index_keeps_column_order() {
        let stats = stats_with(&["users"], [5.0], 1);
        let analysis =
            analyze_text("select id from users where status = 'active' and email = 'a@b.c'");

        let suggestions = SuggestionGenerator::new().generate(&stats, &analysis, None);

        assert_eq!(suggestions.len(), 1);
        let s = &suggestions[0];
        assert_eq!(s.severity, Severity::High);
        assert_eq!(s.cost, ImplementationCost::Medium);
        assert_eq!(s.columns, vec!["status".to_string(), "email".to_string()]);
        assert_eq!(
            s.hint.as_deref(),
            Some("CREATE INDEX ON users (status, email)")
        );
    }

    #[test]
    fn test_non_select_gets_no_index_rules() {
        let stats = stats_with(&["users"], [5.0], 1);
        let analysis = analyze_text("update users set name = 'x' where email = 'a@b.c'");

        let suggestions = SuggestionGenerator::new().generate(&stats, &analysis, None);
        assert!(suggestions.is_empty());
    }
}

mod rewrite_rule_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_select_star_on_orders() {
        let stats = stats_with(&["orders"], [5.0], 1);
        let analysis = analyze_text("SELECT * FROM orders");

        let suggestions = SuggestionGenerator::new().generate(&stats, &analysis, None);

        assert_eq!(
            kinds(&suggestions),
            vec![(SuggestionType::ModifyQuery, Severity::Low)]
        );
    }

    #[test]
    fn test_or_and_function_rules() {
        let stats = stats_with(&["users"], [5.0], 1);
        let analysis = analyze_text("select id from users where lower(email) = 'x' or id = 3");

        let suggestions = SuggestionGenerator::new().generate(&stats, &analysis, None);

        assert_eq!(
            kinds(&suggestions),
            vec![
                (SuggestionType::ModifyQuery, Severity::High),
                (SuggestionType::AddIndex, Severity::Medium),
                (SuggestionType::RewriteQuery, Severity::Medium),
            ]
        );
        assert!(suggestions[2].hint.as_deref().unwrap().contains("UNION"));
    }
}

mod table_rule_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_high_row_scan_suggests_partitioning() {
        let stats = stats_with(&["events"], [50.0, 60.0], 20_000);
        let suggestions =
            SuggestionGenerator::new().generate(&stats, &TextAnalysis::empty(), None);

        assert_eq!(
            kinds(&suggestions),
            vec![(SuggestionType::PartitionTable, Severity::Medium)]
        );
        assert_eq!(suggestions[0].table.as_deref(), Some("events"));
    }

    #[test]
    fn test_unstable_durations_suggest_statistics_refresh() {
        let durations = (0..102).map(|i| if i % 2 == 0 { 10.0 } else { 1000.0 });
        let stats = stats_with(&["t"], durations, 1);

        let suggestions =
            SuggestionGenerator::new().generate(&stats, &TextAnalysis::empty(), None);

        assert_eq!(
            kinds(&suggestions),
            vec![(SuggestionType::UpdateStatistics, Severity::Low)]
        );
        assert_eq!(suggestions[0].table.as_deref(), Some("t"));
    }

    #[test]
    fn test_stable_durations_do_not() {
        let stats = stats_with(&["t"], [100.0; 150], 1);
        let suggestions =
            SuggestionGenerator::new().generate(&stats, &TextAnalysis::empty(), None);
        assert!(suggestions.is_empty());
    }
}

mod plan_rule_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_full_scan_over_threshold() {
        let stats = stats_with(&["orders"], [5.0], 1);
        let plan = ExecutionPlan::new(1234.5, 50_000).with_node_types(["Seq Scan"]);

        let suggestions =
            SuggestionGenerator::new().generate(&stats, &TextAnalysis::empty(), Some(&plan));

        assert_eq!(
            kinds(&suggestions),
            vec![(SuggestionType::AddIndex, Severity::High)]
        );
        assert_eq!(suggestions[0].cost, ImplementationCost::Medium);
    }

    #[test]
    fn test_small_or_indexed_plans_are_ignored() {
        let stats = stats_with(&["orders"], [5.0], 1);
        let generator = SuggestionGenerator::new();

        let small = ExecutionPlan::new(10.0, 500).with_node_types(["Seq Scan"]);
        assert!(generator
            .generate(&stats, &TextAnalysis::empty(), Some(&small))
            .is_empty());

        let indexed = ExecutionPlan::new(10.0, 50_000).with_node_types(["Index Scan"]);
        assert!(generator
            .generate(&stats, &TextAnalysis::empty(), Some(&indexed))
            .is_empty());
    }
}

// ============================================================================
// Ranking
// ============================================================================

mod ranking_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn suggestion(severity: Severity, improvement: Option<f64>, message: &str) -> OptimizationSuggestion {
        let s = OptimizationSuggestion::new(
            SuggestionType::ModifyQuery,
            severity,
            ImplementationCost::Low,
            message,
        );
        match improvement {
            Some(ms) => s.with_estimated_improvement_ms(ms),
            None => s,
        }
    }

    #[test]
    fn test_rank_by_severity_then_improvement() {
        let ranked = rank_suggestions(
            vec![
                suggestion(Severity::Low, Some(900.0), "a"),
                suggestion(Severity::High, Some(10.0), "b"),
                suggestion(Severity::High, Some(50.0), "c"),
                suggestion(Severity::Critical, None, "d"),
                suggestion(Severity::Medium, None, "e"),
            ],
            10,
        );
        let messages: Vec<_> = ranked.iter().map(|s| s.message.as_str()).collect();
        assert_eq!(messages, vec!["d", "c", "b", "e", "a"]);
    }

    #[test]
    fn test_rank_is_stable_for_ties() {
        let ranked = rank_suggestions(
            vec![
                suggestion(Severity::Medium, None, "first"),
                suggestion(Severity::Medium, Some(0.0), "second"),
                suggestion(Severity::Medium, None, "third"),
            ],
            10,
        );
        let messages: Vec<_> = ranked.iter().map(|s| s.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_generate_truncates() {
        let stats = stats_with(&["users"], [5.0], 1);
        let analysis = analyze_text("select id from users where lower(email) = 'x' or id = 3");
        let generator = SuggestionGenerator::with_config(
            GeneratorConfig::new().with_max_suggestions_per_query(2),
        );

        let suggestions = generator.generate(&stats, &analysis, None);

        assert_eq!(
            kinds(&suggestions),
            vec![
                (SuggestionType::ModifyQuery, Severity::High),
                (SuggestionType::AddIndex, Severity::Medium),
            ]
        );
    }

    #[test]
    fn test_generate_is_deterministic() {
        let stats = stats_with(&["orders", "customers"], [1500.0; 40], 50_000);
        let analysis = analyze_text(
            "SELECT * FROM orders o JOIN customers c ON c.id = o.customer_id \
             WHERE o.status = 'x' OR upper(c.name) = 'Y'",
        );
        let plan = ExecutionPlan::new(99.0, 80_000).with_node_types(["Seq Scan"]);
        let generator = SuggestionGenerator::new();

        let first = serde_json::to_string(&generator.generate(&stats, &analysis, Some(&plan)))
            .unwrap();
        for _ in 0..5 {
            let again =
                serde_json::to_string(&generator.generate(&stats, &analysis, Some(&plan)))
                    .unwrap();
            assert_eq!(again, first);
        }
    }
}

// ============================================================================
// System-wide suggestions
// ============================================================================

mod system_wide_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_slow_fraction_thresholds() {
        let generator = SuggestionGenerator::new();

        assert!(generator.system_wide(10, 1, &[]).is_empty());
        assert!(generator.system_wide(0, 0, &[]).is_empty());

        assert_eq!(
            kinds(&generator.system_wide(10, 2, &[])),
            vec![(SuggestionType::UpdateStatistics, Severity::High)]
        );
        assert_eq!(
            kinds(&generator.system_wide(10, 6, &[])),
            vec![(SuggestionType::UpdateStatistics, Severity::Critical)]
        );
    }

    #[test]
    fn test_unused_indexes() {
        let usage = vec![
            IndexUsage::new("orders", "orders_pkey", 500, 600),
            IndexUsage::new("orders", "idx_orders_legacy", 0, 0),
        ];
        let suggestions = SuggestionGenerator::new().system_wide(3, 0, &usage);

        assert_eq!(
            kinds(&suggestions),
            vec![(SuggestionType::DropIndex, Severity::Low)]
        );
        assert!(suggestions[0].message.contains("idx_orders_legacy"));
    }
}
