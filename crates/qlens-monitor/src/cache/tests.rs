//! Unit tests for the plan cache

use super::*;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use qlens_core::{ExecutionPlan, Fingerprint, QlensError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn fp(name: &str) -> Fingerprint {
    Fingerprint::of(&format!("select * from {name}"))
}

fn at(offset_secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + ChronoDuration::seconds(1_700_000_000 + offset_secs)
}

async fn ok_plan(rows: u64) -> Result<ExecutionPlan> {
    Ok(ExecutionPlan::new(1.0, rows))
}

mod capacity_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_oldest_fingerprint_is_evicted() {
        let cache = PlanCache::new(2, Duration::from_secs(1));

        cache.get_or_fetch(&fp("a"), at(1), || ok_plan(1)).await.unwrap();
        cache.get_or_fetch(&fp("b"), at(2), || ok_plan(2)).await.unwrap();
        cache.get_or_fetch(&fp("c"), at(3), || ok_plan(3)).await.unwrap();

        let mut expected = vec![fp("b"), fp("c")];
        expected.sort();
        assert_eq!(cache.fingerprints(), expected);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_touch_changes_eviction_order() {
        let cache = PlanCache::new(2, Duration::from_secs(1));

        cache.get_or_fetch(&fp("a"), at(1), || ok_plan(1)).await.unwrap();
        cache.get_or_fetch(&fp("b"), at(2), || ok_plan(2)).await.unwrap();
        cache.touch(&fp("a"), at(5));
        cache.get_or_fetch(&fp("c"), at(6), || ok_plan(3)).await.unwrap();

        assert!(cache.contains(&fp("a")));
        assert!(!cache.contains(&fp("b")));
        assert!(cache.contains(&fp("c")));
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let cache = PlanCache::new(3, Duration::from_secs(1));
        for i in 0..50 {
            cache.insert(fp(&format!("t{i}")), ExecutionPlan::new(1.0, 1), at(i % 7));
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_zero_capacity_caches_nothing() {
        let cache = PlanCache::new(0, Duration::from_secs(1));
        cache.insert(fp("a"), ExecutionPlan::new(1.0, 1), at(0));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reinsert_does_not_evict() {
        let cache = PlanCache::new(2, Duration::from_secs(1));
        cache.insert(fp("a"), ExecutionPlan::new(1.0, 1), at(1));
        cache.insert(fp("b"), ExecutionPlan::new(1.0, 1), at(2));
        cache.insert(fp("a"), ExecutionPlan::new(2.0, 9), at(3));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&fp("a")).unwrap().estimated_rows, 9);
    }

    #[test]
    fn test_retain_and_remove() {
        let cache = PlanCache::new(5, Duration::from_secs(1));
        for name in ["a", "b", "c"] {
            cache.insert(fp(name), ExecutionPlan::new(1.0, 1), at(0));
        }

        let keep = fp("a");
        assert_eq!(cache.retain(|f| *f == keep || *f == fp("b")), 1);
        assert!(cache.remove(&fp("b")).is_some());
        assert_eq!(cache.fingerprints(), vec![fp("a")]);
        assert!(cache.trim_to_capacity().is_empty());
    }
}

mod fetch_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_cached_plan_is_not_refetched() {
        let cache = PlanCache::new(10, Duration::from_secs(1));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let plan = cache
                .get_or_fetch(&fp("a"), at(0), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    ok_plan(42)
                })
                .await
                .unwrap();
            assert_eq!(plan.estimated_rows, 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = PlanCache::new(10, Duration::from_secs(1));

        let err = cache
            .get_or_fetch(&fp("a"), at(0), || async {
                Err(QlensError::ExternalSource("explain failed".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QlensError::ExternalSource(_)));
        assert!(cache.is_empty());

        let plan = cache.get_or_fetch(&fp("a"), at(1), || ok_plan(7)).await.unwrap();
        assert_eq!(plan.estimated_rows, 7);
    }

    #[tokio::test]
    async fn test_slow_fetch_times_out() {
        let cache = PlanCache::new(10, Duration::from_millis(20));

        let err = cache
            .get_or_fetch(&fp("a"), at(0), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                ok_plan(1).await
            })
            .await
            .unwrap_err();

        assert!(matches!(err, QlensError::Timeout(_)));
        assert!(!cache.contains(&fp("a")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_fetch() {
        let cache = Arc::new(PlanCache::new(10, Duration::from_secs(5)));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .get_or_fetch(&fp("a"), at(0), || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            ok_plan(5).await
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().estimated_rows, 5);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failure_is_not_retried_by_waiters() {
        let cache = Arc::new(PlanCache::new(10, Duration::from_secs(5)));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .get_or_fetch(&fp("a"), at(0), || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(300)).await;
                            Err(QlensError::ExternalSource("down".into()))
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().is_err());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_fetch_can_be_retried() {
        let cache = PlanCache::new(10, Duration::from_secs(30));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            cache.get_or_fetch(&fp("a"), at(0), || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                ok_plan(1).await
            }),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(cache.pending_fetches(), 0);

        let plan = cache.get_or_fetch(&fp("a"), at(1), || ok_plan(3)).await.unwrap();
        assert_eq!(plan.estimated_rows, 3);
        assert!(cache.contains(&fp("a")));
        assert_eq!(cache.pending_fetches(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_waiter_fetches_after_first_caller_is_cancelled() {
        let cache = Arc::new(PlanCache::new(10, Duration::from_secs(30)));

        let first = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_fetch(&fp("a"), at(0), || async {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                        ok_plan(1).await
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let waiter = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_or_fetch(&fp("a"), at(1), || ok_plan(8)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        first.abort();

        let plan = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(plan.estimated_rows, 8);
        assert!(cache.contains(&fp("a")));
        assert_eq!(cache.pending_fetches(), 0);
    }
}
