//! Bounded execution plan cache
//!
//! Plans are fetched lazily, at most once per fingerprint while cached, and
//! are never refreshed. Capacity pressure evicts the plan whose fingerprint
//! was executed least recently; plans themselves are never "used" in a way
//! that would give a better recency signal.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use qlens_core::{ExecutionPlan, Fingerprint, QlensError, Result, with_timeout};
use tokio::sync::OwnedMutexGuard;

/// A cached plan and the last execution time of its fingerprint
#[derive(Debug, Clone)]
pub struct CachedPlan {
    pub plan: ExecutionPlan,
    pub last_executed: DateTime<Utc>,
}

/// Per-fingerprint fetch slot; `true` once a fetch has been attempted
type FetchSlot = Arc<tokio::sync::Mutex<bool>>;

/// Plan cache bounded to `max_entries`
#[derive(Debug)]
pub struct PlanCache {
    max_entries: usize,
    fetch_timeout: Duration,
    entries: Mutex<HashMap<Fingerprint, CachedPlan>>,
    in_flight: Mutex<HashMap<Fingerprint, FetchSlot>>,
}

impl PlanCache {
    pub fn new(max_entries: usize, fetch_timeout: Duration) -> Self {
        Self {
            max_entries,
            fetch_timeout,
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.lock().contains_key(fingerprint)
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<ExecutionPlan> {
        self.entries
            .lock()
            .get(fingerprint)
            .map(|cached| cached.plan.clone())
    }

    /// Cached fingerprints, sorted
    pub fn fingerprints(&self) -> Vec<Fingerprint> {
        let mut keys: Vec<Fingerprint> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the cached plan, or runs `fetch` under the configured timeout
    /// and caches a successful result.
    ///
    /// Failures are not cached. Concurrent callers for the same fingerprint
    /// wait for the first fetch instead of issuing their own; if it failed
    /// they get an error rather than retrying. A fetch whose caller is
    /// dropped before it completes does not count as an attempt.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        last_executed: DateTime<Utc>,
        fetch: F,
    ) -> Result<ExecutionPlan>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ExecutionPlan>>,
    {
        if let Some(plan) = self.lookup(fingerprint, last_executed) {
            return Ok(plan);
        }

        let slot = self
            .in_flight
            .lock()
            .entry(fingerprint.clone())
            .or_default()
            .clone();
        let mut guard = FetchGuard {
            in_flight: &self.in_flight,
            fingerprint,
            attempted: slot.clone().lock_owned().await,
            slot,
            completed: false,
        };

        if let Some(plan) = self.lookup(fingerprint, last_executed) {
            guard.completed = true;
            return Ok(plan);
        }
        if *guard.attempted {
            guard.completed = true;
            return Err(QlensError::ExternalSource(format!(
                "plan fetch for {} failed on a concurrent attempt",
                fingerprint.short()
            )));
        }

        *guard.attempted = true;
        let result = with_timeout("plan fetch", self.fetch_timeout, fetch()).await;
        if let Ok(plan) = &result {
            self.insert(fingerprint.clone(), plan.clone(), last_executed);
        }
        guard.completed = true;

        result
    }

    #[cfg(test)]
    pub(crate) fn pending_fetches(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Inserts a plan, evicting the least recently executed fingerprints
    /// first if the cache is full
    pub fn insert(&self, fingerprint: Fingerprint, plan: ExecutionPlan, last_executed: DateTime<Utc>) {
        if self.max_entries == 0 {
            return;
        }

        let mut entries = self.entries.lock();
        if !entries.contains_key(&fingerprint) {
            while entries.len() >= self.max_entries {
                if evict_oldest(&mut entries).is_none() {
                    break;
                }
            }
        }
        entries.insert(
            fingerprint,
            CachedPlan {
                plan,
                last_executed,
            },
        );
    }

    /// Records a new execution time for a cached fingerprint
    pub fn touch(&self, fingerprint: &Fingerprint, at: DateTime<Utc>) {
        if let Some(cached) = self.entries.lock().get_mut(fingerprint) {
            if at > cached.last_executed {
                cached.last_executed = at;
            }
        }
    }

    pub fn remove(&self, fingerprint: &Fingerprint) -> Option<ExecutionPlan> {
        self.entries
            .lock()
            .remove(fingerprint)
            .map(|cached| cached.plan)
    }

    /// Keeps only plans whose fingerprint satisfies `keep`; returns how many
    /// were dropped
    pub fn retain(&self, mut keep: impl FnMut(&Fingerprint) -> bool) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|fingerprint, _| keep(fingerprint));
        before - entries.len()
    }

    /// Evicts least recently executed plans until the cache is within
    /// capacity; returns the evicted fingerprints
    pub fn trim_to_capacity(&self) -> Vec<Fingerprint> {
        let mut entries = self.entries.lock();
        let mut evicted = Vec::new();
        while entries.len() > self.max_entries {
            match evict_oldest(&mut entries) {
                Some(fingerprint) => evicted.push(fingerprint),
                None => break,
            }
        }
        evicted
    }

    fn lookup(&self, fingerprint: &Fingerprint, at: DateTime<Utc>) -> Option<ExecutionPlan> {
        let mut entries = self.entries.lock();
        let cached = entries.get_mut(fingerprint)?;
        if at > cached.last_executed {
            cached.last_executed = at;
        }
        Some(cached.plan.clone())
    }
}

/// Holds a fingerprint's fetch slot for one `get_or_fetch` call.
///
/// On drop the slot leaves `in_flight`. If the call never completed, the
/// attempt flag is reset so waiters on the same slot fetch for themselves.
struct FetchGuard<'a> {
    in_flight: &'a Mutex<HashMap<Fingerprint, FetchSlot>>,
    fingerprint: &'a Fingerprint,
    slot: FetchSlot,
    attempted: OwnedMutexGuard<bool>,
    completed: bool,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            *self.attempted = false;
        }

        let mut in_flight = self.in_flight.lock();
        if in_flight
            .get(self.fingerprint)
            .is_some_and(|current| Arc::ptr_eq(current, &self.slot))
        {
            in_flight.remove(self.fingerprint);
        }
    }
}

/// Removes the entry with the oldest `last_executed` (ties broken by
/// fingerprint so eviction is deterministic)
fn evict_oldest(entries: &mut HashMap<Fingerprint, CachedPlan>) -> Option<Fingerprint> {
    let oldest = entries
        .iter()
        .min_by(|(fa, a), (fb, b)| a.last_executed.cmp(&b.last_executed).then_with(|| fa.cmp(fb)))
        .map(|(fingerprint, _)| fingerprint.clone())?;
    entries.remove(&oldest);
    Some(oldest)
}
