//! JSON-lines execution logs
//!
//! Each non-empty line is one execution:
//! `{"query": "...", "duration_ms": 12.5, "rows_examined": 100, "rows_returned": 3}`.
//! Only `query` is required.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use qlens_core::{ExecutionPlan, LiveStatement, QlensError, Result, SqlExecutionSource};
use serde::{Deserialize, Serialize};

/// One logged execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub query: String,
    #[serde(default)]
    pub duration_ms: Option<f64>,
    #[serde(default)]
    pub rows_examined: Option<u64>,
    #[serde(default)]
    pub rows_returned: Option<u64>,
}

/// Parses a JSON-lines log; errors name the offending line
pub fn parse_log(content: &str) -> anyhow::Result<Vec<ExecutionRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("invalid execution record on line {}", index + 1))
        })
        .collect()
}

pub fn read_log(path: &Path) -> anyhow::Result<Vec<ExecutionRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read execution log {}", path.display()))?;
    parse_log(&content)
}

/// Live statement source backed by a recorded log.
///
/// Reports every distinct query whose mean logged duration is above the slow
/// threshold, slowest first, on every poll. Plans are not available.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    statements: Vec<LiveStatement>,
}

impl ReplaySource {
    pub fn new(records: &[ExecutionRecord], slow_threshold_ms: f64) -> Self {
        let mut totals: BTreeMap<&str, (f64, u64)> = BTreeMap::new();
        for record in records {
            if let Some(duration) = record.duration_ms {
                let entry = totals.entry(record.query.as_str()).or_default();
                entry.0 += duration;
                entry.1 += 1;
            }
        }

        let mut statements: Vec<LiveStatement> = totals
            .into_iter()
            .map(|(query, (total, calls))| LiveStatement::new(query, total / calls as f64, calls))
            .filter(|statement| statement.mean_duration_ms > slow_threshold_ms)
            .collect();
        statements.sort_by(|a, b| b.mean_duration_ms.total_cmp(&a.mean_duration_ms));

        Self { statements }
    }

    pub fn statements(&self) -> &[LiveStatement] {
        &self.statements
    }
}

#[async_trait]
impl SqlExecutionSource for ReplaySource {
    fn name(&self) -> &str {
        "replay-log"
    }

    async fn fetch_plan(&self, _query: &str) -> Result<ExecutionPlan> {
        Err(QlensError::NotSupported(
            "execution logs carry no plans".to_string(),
        ))
    }

    async fn live_slow_statements(&self, limit: usize) -> Result<Vec<LiveStatement>> {
        Ok(self.statements.iter().take(limit).cloned().collect())
    }
}
