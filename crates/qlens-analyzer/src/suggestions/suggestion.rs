//! Optimization suggestion types

use serde::{Deserialize, Serialize};

/// Severity of a suggestion, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Ranking ordinal: critical=4, high=3, medium=2, low=1
    pub fn ordinal(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    /// Returns true for high and critical suggestions
    pub fn is_high_or_above(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of change a suggestion recommends
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuggestionType {
    /// Create a single-column or composite index
    AddIndex,
    /// Restructure the statement (e.g. split OR into UNION)
    RewriteQuery,
    /// Small local change to the statement text
    ModifyQuery,
    /// Partition a table scanned in large volumes
    PartitionTable,
    /// Refresh planner statistics
    UpdateStatistics,
    /// Review an index that is never used
    DropIndex,
}

impl SuggestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddIndex => "add-index",
            Self::RewriteQuery => "rewrite-query",
            Self::ModifyQuery => "modify-query",
            Self::PartitionTable => "partition-table",
            Self::UpdateStatistics => "update-statistics",
            Self::DropIndex => "drop-index",
        }
    }

    /// Returns a human-readable description of this suggestion type
    pub fn description(&self) -> &'static str {
        match self {
            Self::AddIndex => "Consider adding an index",
            Self::RewriteQuery => "Consider rewriting the query",
            Self::ModifyQuery => "Consider modifying the query",
            Self::PartitionTable => "Consider partitioning the table",
            Self::UpdateStatistics => "Planner statistics may be outdated",
            Self::DropIndex => "Index appears to be unused",
        }
    }
}

impl std::fmt::Display for SuggestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rough effort needed to apply a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImplementationCost {
    Low,
    Medium,
    High,
}

impl ImplementationCost {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A single advisory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSuggestion {
    /// Type of suggestion
    pub suggestion_type: SuggestionType,
    /// Severity level
    pub severity: Severity,
    /// Implementation effort
    pub cost: ImplementationCost,
    /// Human-readable message explaining the issue
    pub message: String,
    /// Related table name, if applicable
    pub table: Option<String>,
    /// Related column names, in order of appearance
    pub columns: Vec<String>,
    /// Estimated saving per execution (ms)
    pub estimated_improvement_ms: Option<f64>,
    /// Concrete hint, such as a DDL sketch
    pub hint: Option<String>,
}

impl OptimizationSuggestion {
    /// Creates a new suggestion
    pub fn new(
        suggestion_type: SuggestionType,
        severity: Severity,
        cost: ImplementationCost,
        message: impl Into<String>,
    ) -> Self {
        Self {
            suggestion_type,
            severity,
            cost,
            message: message.into(),
            table: None,
            columns: Vec::new(),
            estimated_improvement_ms: None,
            hint: None,
        }
    }

    /// Sets the related table
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Sets the related columns
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    /// Sets the estimated improvement; negative or non-finite values are dropped
    pub fn with_estimated_improvement_ms(mut self, improvement_ms: f64) -> Self {
        self.estimated_improvement_ms =
            (improvement_ms.is_finite() && improvement_ms >= 0.0).then_some(improvement_ms);
        self
    }

    /// Sets the hint text
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Improvement used for ranking; absent estimates rank as zero
    pub fn improvement_for_ranking(&self) -> f64 {
        self.estimated_improvement_ms.unwrap_or(0.0)
    }
}
