//! Shared mock execution source for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use qlens_core::{ExecutionPlan, IndexUsage, LiveStatement, QlensError, Result, SqlExecutionSource};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// How a mocked call behaves
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Behavior {
    #[default]
    Succeed,
    Fail,
    Panic,
    Hang,
}

#[derive(Default)]
pub struct MockSource {
    pub plan_calls: AtomicUsize,
    pub live_calls: AtomicUsize,
    pub usage_calls: AtomicUsize,
    pub plans: Behavior,
    pub live: Behavior,
    pub usage: Behavior,
    pub statements: Vec<LiveStatement>,
    pub indexes: Vec<IndexUsage>,
}

impl MockSource {
    pub fn plan_calls(&self) -> usize {
        self.plan_calls.load(Ordering::SeqCst)
    }

    pub fn live_calls(&self) -> usize {
        self.live_calls.load(Ordering::SeqCst)
    }

    pub fn usage_calls(&self) -> usize {
        self.usage_calls.load(Ordering::SeqCst)
    }
}

async fn act<T>(behavior: Behavior, what: &str, value: T) -> Result<T> {
    match behavior {
        Behavior::Succeed => Ok(value),
        Behavior::Fail => Err(QlensError::ExternalSource(format!("{} unavailable", what))),
        Behavior::Panic => panic!("{} exploded", what),
        Behavior::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(value)
        }
    }
}

#[async_trait]
impl SqlExecutionSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_plan(&self, _query: &str) -> Result<ExecutionPlan> {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        act(
            self.plans,
            "explain",
            ExecutionPlan::new(12.5, 40).with_node_types(["Index Scan"]),
        )
        .await
    }

    async fn live_slow_statements(&self, limit: usize) -> Result<Vec<LiveStatement>> {
        self.live_calls.fetch_add(1, Ordering::SeqCst);
        let statements = self.statements.iter().take(limit).cloned().collect();
        act(self.live, "live statements", statements).await
    }

    async fn index_usage(&self) -> Result<Vec<IndexUsage>> {
        self.usage_calls.fetch_add(1, Ordering::SeqCst);
        act(self.usage, "index usage", self.indexes.clone()).await
    }
}
