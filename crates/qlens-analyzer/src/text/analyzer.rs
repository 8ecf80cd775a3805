//! Query Text Analyzer
//!
//! Classifies a statement, lists the tables it touches, scores its
//! structural complexity, estimates predicate selectivity and flags
//! anti-patterns. Analysis is pure and never fails: unreadable input yields
//! [`TextAnalysis::empty`].

use std::collections::BTreeSet;
use std::sync::LazyLock;

use qlens_core::QueryType;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::patterns::AntiPattern;
use super::tokens::{PreparedQuery, is_identifier};

static JOIN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bjoin\b").expect("valid regex"));
static UNION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bunion\b").expect("valid regex"));
static SUBQUERY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*select\b").expect("valid regex"));
static GROUP_BY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bgroup\s+by\b").expect("valid regex"));
static ORDER_BY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\border\s+by\b").expect("valid regex"));
static HAVING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bhaving\b").expect("valid regex"));
static CASE_WHEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bcase\b").expect("valid regex"));

/// Operators treated as index-usable comparisons
const COMPARISON_OPERATORS: &[&str] = &["=", "<", ">", "<=", ">=", "between"];

/// A column referenced by a WHERE predicate, resolved to its table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

/// Result of static query text analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnalysis {
    /// Statement category from the leading keyword
    pub query_type: QueryType,
    /// Tables referenced in FROM/JOIN/UPDATE/INTO/DELETE FROM positions
    pub tables: BTreeSet<String>,
    /// Structural complexity in `[0, 100]`
    pub complexity_score: f64,
    /// Estimated fraction of rows kept by the predicates, in `[0.001, 1.0]`
    pub selectivity_estimate: f64,
    /// Matched anti-patterns
    pub anti_patterns: BTreeSet<AntiPattern>,
    /// Columns compared in the WHERE clause, in order of appearance
    pub predicate_columns: Vec<ColumnRef>,
    /// Whether the outermost statement has a WHERE clause
    pub has_where_clause: bool,
}

impl TextAnalysis {
    /// Worst-case analysis used for empty or unreadable input
    pub fn empty() -> Self {
        Self {
            query_type: QueryType::Unknown,
            tables: BTreeSet::new(),
            complexity_score: 0.0,
            selectivity_estimate: 1.0,
            anti_patterns: BTreeSet::new(),
            predicate_columns: Vec::new(),
            has_where_clause: false,
        }
    }

    /// Returns true if `pattern` was detected
    pub fn has(&self, pattern: AntiPattern) -> bool {
        self.anti_patterns.contains(&pattern)
    }

    /// Predicate columns grouped by table.
    ///
    /// Tables appear in order of their first predicate; columns keep their
    /// order of first appearance and are deduplicated.
    pub fn columns_by_table(&self) -> Vec<(String, Vec<String>)> {
        let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
        for col in &self.predicate_columns {
            match grouped.iter_mut().find(|(table, _)| *table == col.table) {
                Some((_, columns)) => {
                    if !columns.contains(&col.column) {
                        columns.push(col.column.clone());
                    }
                }
                None => grouped.push((col.table.clone(), vec![col.column.clone()])),
            }
        }
        grouped
    }
}

impl Default for TextAnalysis {
    fn default() -> Self {
        Self::empty()
    }
}

/// Static analysis of query text.
///
/// The engine only depends on this trait, so a parser-backed implementation
/// can replace [`HeuristicTextAnalyzer`] without touching any caller.
pub trait TextAnalyzer: Send + Sync {
    /// Analyzes `text`; must be deterministic and must not fail
    fn analyze(&self, text: &str) -> TextAnalysis;
}

/// Regex/token based analyzer
#[derive(Debug, Clone)]
pub struct HeuristicTextAnalyzer {
    checks: Vec<AntiPattern>,
}

impl Default for HeuristicTextAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl HeuristicTextAnalyzer {
    /// Creates an analyzer running every anti-pattern check
    pub fn new() -> Self {
        Self {
            checks: AntiPattern::ALL.to_vec(),
        }
    }

    /// Creates an analyzer running only the given checks
    pub fn with_checks(checks: impl IntoIterator<Item = AntiPattern>) -> Self {
        Self {
            checks: checks.into_iter().collect(),
        }
    }

    /// Returns the enabled checks
    pub fn checks(&self) -> &[AntiPattern] {
        &self.checks
    }
}

impl TextAnalyzer for HeuristicTextAnalyzer {
    fn analyze(&self, text: &str) -> TextAnalysis {
        if text.trim().is_empty() {
            return TextAnalysis::empty();
        }

        let query = PreparedQuery::new(text);
        let query_type = query
            .first_keyword()
            .map(QueryType::from_keyword)
            .unwrap_or(QueryType::Unknown);

        let anti_patterns = self
            .checks
            .iter()
            .copied()
            .filter(|check| check.detect(&query, query_type))
            .collect();

        TextAnalysis {
            query_type,
            tables: query.tables.iter().map(|t| t.name.clone()).collect(),
            complexity_score: complexity_score(&query, text.chars().count()),
            selectivity_estimate: selectivity_estimate(&query),
            anti_patterns,
            predicate_columns: predicate_columns(&query),
            has_where_clause: query.where_range.is_some(),
        }
    }
}

/// Analyzes `text` with the default heuristic analyzer
pub fn analyze_text(text: &str) -> TextAnalysis {
    HeuristicTextAnalyzer::new().analyze(text)
}

/// Weighted structural score, clamped to `[0, 100]`
fn complexity_score(query: &PreparedQuery, text_len: usize) -> f64 {
    let text = query.masked.as_str();
    let count = |re: &Regex| re.find_iter(text).count() as f64;

    let score = count(&JOIN_REGEX) * 10.0
        + count(&UNION_REGEX) * 15.0
        + count(&SUBQUERY_REGEX) * 20.0
        + count(&GROUP_BY_REGEX) * 5.0
        + count(&ORDER_BY_REGEX) * 3.0
        + count(&HAVING_REGEX) * 8.0
        + count(&CASE_WHEN_REGEX) * 5.0
        + text_len as f64 / 100.0;

    score.clamp(0.0, 100.0)
}

/// Multiplicative selectivity estimate over the outermost WHERE clause
fn selectivity_estimate(query: &PreparedQuery) -> f64 {
    if query.where_range.is_none() {
        return 1.0;
    }

    let mut selectivity: f64 = 0.1;
    for token in query.where_tokens() {
        selectivity *= match token.as_str() {
            "=" => 0.1,
            "<" | ">" | "<=" | ">=" | "between" => 0.5,
            "like" | "ilike" => 0.3,
            _ => 1.0,
        };
    }

    selectivity.clamp(0.001, 1.0)
}

/// Columns on the left-hand side of comparisons in the WHERE clause.
///
/// Qualified columns are resolved through table aliases; unqualified ones are
/// attributed to the first table of the statement.
fn predicate_columns(query: &PreparedQuery) -> Vec<ColumnRef> {
    let Some(primary) = query.tables.first() else {
        return Vec::new();
    };
    let aliases = query.alias_map();
    let tokens = query.where_tokens();
    let mut columns: Vec<ColumnRef> = Vec::new();

    for (idx, token) in tokens.iter().enumerate() {
        if !COMPARISON_OPERATORS.contains(&token.as_str()) || idx == 0 {
            continue;
        }
        let operand = tokens[idx - 1].as_str();
        if !is_identifier(operand) {
            continue;
        }

        let column_ref = match operand.rsplit_once('.') {
            Some((qualifier, column)) => match aliases.get(qualifier) {
                Some(table) => ColumnRef {
                    table: (*table).to_string(),
                    column: column.to_string(),
                },
                None => continue,
            },
            None => ColumnRef {
                table: primary.name.clone(),
                column: operand.to_string(),
            },
        };

        if !columns.contains(&column_ref) {
            columns.push(column_ref);
        }
    }

    columns
}
