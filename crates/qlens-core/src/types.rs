//! Core types for qlens

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statement category, taken from the first keyword of the query text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Alter,
    Drop,
    Analyze,
    Vacuum,
    Unknown,
}

impl QueryType {
    /// Maps a leading keyword (any case) to a query type
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.to_ascii_lowercase().as_str() {
            "select" => Self::Select,
            "insert" => Self::Insert,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "create" => Self::Create,
            "alter" => Self::Alter,
            "drop" => Self::Drop,
            "analyze" | "analyse" => Self::Analyze,
            "vacuum" => Self::Vacuum,
            _ => Self::Unknown,
        }
    }

    /// Returns true for schema-changing statements
    pub fn is_ddl(&self) -> bool {
        matches!(self, Self::Create | Self::Alter | Self::Drop)
    }

    /// Returns true for statements that modify rows
    pub fn is_dml_write(&self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Create => "create",
            Self::Alter => "alter",
            Self::Drop => "drop",
            Self::Analyze => "analyze",
            Self::Vacuum => "vacuum",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory plan metadata returned by the database's explain facility.
///
/// Cost, row and width figures are planner estimates, not measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Total estimated cost in planner units
    pub estimated_cost: f64,
    /// Estimated number of rows produced
    pub estimated_rows: u64,
    /// Estimated average row width in bytes
    pub plan_width: Option<u32>,
    /// Node types of the plan tree in depth-first order (e.g. "Seq Scan")
    pub node_types: Vec<String>,
    /// When the plan was obtained
    pub fetched_at: DateTime<Utc>,
}

impl ExecutionPlan {
    /// Creates a plan with the given estimates and no shape information
    pub fn new(estimated_cost: f64, estimated_rows: u64) -> Self {
        Self {
            estimated_cost,
            estimated_rows,
            plan_width: None,
            node_types: Vec::new(),
            fetched_at: Utc::now(),
        }
    }

    /// Sets the row width estimate
    pub fn with_width(mut self, width: u32) -> Self {
        self.plan_width = Some(width);
        self
    }

    /// Sets the plan shape
    pub fn with_node_types<I, S>(mut self, node_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.node_types = node_types.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if any node reads a whole table.
    ///
    /// Recognises PostgreSQL (`Seq Scan`), SQLite (`SCAN TABLE`), MySQL
    /// (`ALL` / `Full Table Scan`) and generic `Table Scan` spellings.
    pub fn has_full_scan(&self) -> bool {
        self.node_types.iter().any(|node| {
            let node = node.to_ascii_lowercase();
            node.contains("seq scan")
                || node.contains("full table scan")
                || node.contains("table scan")
                || node.starts_with("scan table")
                || node == "all"
        })
    }
}

/// A statement reported by the database's live statistics view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveStatement {
    /// Statement text as reported by the database
    pub text: String,
    /// Mean execution time across recorded calls (ms)
    pub mean_duration_ms: f64,
    /// Number of recorded calls
    pub call_count: u64,
}

impl LiveStatement {
    pub fn new(text: impl Into<String>, mean_duration_ms: f64, call_count: u64) -> Self {
        Self {
            text: text.into(),
            mean_duration_ms,
            call_count,
        }
    }
}

/// Usage counters for one index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexUsage {
    pub table: String,
    pub index: String,
    /// Number of index scans initiated
    pub scans: u64,
    /// Number of index entries read by those scans
    pub reads: u64,
}

impl IndexUsage {
    pub fn new(table: impl Into<String>, index: impl Into<String>, scans: u64, reads: u64) -> Self {
        Self {
            table: table.into(),
            index: index.into(),
            scans,
            reads,
        }
    }

    /// Fraction in `[0, 1]` describing how selective the index is in practice.
    ///
    /// Never-scanned indexes score 0; scanned indexes that read nothing score 1.
    pub fn effectiveness(&self) -> f64 {
        if self.scans == 0 {
            0.0
        } else if self.reads == 0 {
            1.0
        } else {
            (self.scans as f64 / self.reads as f64).clamp(0.0, 1.0)
        }
    }

    /// Returns true if the index has never been used
    pub fn is_unused(&self) -> bool {
        self.scans == 0
    }
}
