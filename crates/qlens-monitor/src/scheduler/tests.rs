//! Unit tests for the scheduler lifecycle

use super::*;
use crate::engine::QueryPerformanceEngine;
use qlens_core::{EngineConfig, QlensError};
use std::sync::Arc;
use std::time::Duration;

fn scheduler() -> Scheduler {
    let engine = QueryPerformanceEngine::new(EngineConfig::default()).unwrap();
    Scheduler::new(Arc::new(engine))
}

mod lifecycle_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_start_and_stop() {
        let scheduler = scheduler();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);

        scheduler.start().unwrap();
        assert!(scheduler.is_running());
        // No source, so only the periodic and cleanup loops run
        assert_eq!(scheduler.running_tasks(), vec!["periodic_analysis", "cleanup"]);

        scheduler.stop().await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(scheduler.running_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let scheduler = scheduler();
        scheduler.start().unwrap();

        let err = scheduler.start().unwrap_err();
        assert!(matches!(err, QlensError::Other(_)));

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let scheduler = scheduler();
        scheduler.stop().await;

        scheduler.start().unwrap();
        scheduler.stop().await;
        scheduler.stop().await;

        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let scheduler = scheduler();
        scheduler.start().unwrap();
        scheduler.stop().await;

        scheduler.start().unwrap();
        assert!(scheduler.is_running());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_first_tick_runs_immediately() {
        let scheduler = scheduler();
        scheduler.start().unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(scheduler.engine().analysis_passes(), 1);

        scheduler.stop().await;
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let scheduler = scheduler();
        assert!(scheduler.start().is_err());
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }
}
