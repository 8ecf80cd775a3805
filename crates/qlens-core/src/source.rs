//! SQL execution source
//!
//! The engine never opens a database connection of its own. Everything it
//! needs from the database (plans, live statement statistics, index usage)
//! comes through an injected [`SqlExecutionSource`].

use async_trait::async_trait;

use crate::{ExecutionPlan, IndexUsage, LiveStatement, QlensError, Result};

/// Database-facing collaborator used by the engine
///
/// Implementations should return [`QlensError::ExternalSource`] on failure;
/// the engine applies its own timeout around every call.
#[async_trait]
pub trait SqlExecutionSource: Send + Sync + 'static {
    /// Name used in log lines
    fn name(&self) -> &str {
        "sql-source"
    }

    /// Run the database's explain facility for `query`
    async fn fetch_plan(&self, query: &str) -> Result<ExecutionPlan>;

    /// Up to `limit` currently slow statements, slowest first
    async fn live_slow_statements(&self, _limit: usize) -> Result<Vec<LiveStatement>> {
        Err(QlensError::NotSupported(format!(
            "{} does not expose live statement statistics",
            self.name()
        )))
    }

    /// Usage counters for every index
    async fn index_usage(&self) -> Result<Vec<IndexUsage>> {
        Err(QlensError::NotSupported(format!(
            "{} does not expose index usage statistics",
            self.name()
        )))
    }
}

#[async_trait]
impl<T: SqlExecutionSource> SqlExecutionSource for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn fetch_plan(&self, query: &str) -> Result<ExecutionPlan> {
        (**self).fetch_plan(query).await
    }

    async fn live_slow_statements(&self, limit: usize) -> Result<Vec<LiveStatement>> {
        (**self).live_slow_statements(limit).await
    }

    async fn index_usage(&self) -> Result<Vec<IndexUsage>> {
        (**self).index_usage().await
    }
}

/// Runs `call` with a timeout, mapping elapsed deadlines to [`QlensError::Timeout`]
pub async fn with_timeout<T, F>(
    operation: &str,
    timeout: std::time::Duration,
    call: F,
) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or_else(|_| {
            Err(QlensError::Timeout(format!(
                "{} did not complete within {:?}",
                operation, timeout
            )))
        })
}
