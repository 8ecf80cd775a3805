//! Scheduler lifecycle: Stopped -> Running -> Stopping -> Stopped

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use qlens_core::{QlensError, Result};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loops::run_loop;
use crate::engine::QueryPerformanceEngine;

const LIVE_TASK: &str = "live_monitoring";
const PERIODIC_TASK: &str = "periodic_analysis";
const CLEANUP_TASK: &str = "cleanup";

/// Lifecycle state of a [`Scheduler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    Running,
    Stopping,
}

/// Owns the three background loops of one engine.
///
/// Loops run on the ambient tokio runtime. Dropping a running scheduler
/// cancels its loops without waiting for them; call [`Scheduler::stop`] to
/// wait until they have exited.
pub struct Scheduler {
    engine: Arc<QueryPerformanceEngine>,
    state: Mutex<SchedulerState>,
    cancel: Mutex<CancellationToken>,
    handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    stop_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state())
            .field("tasks", &self.running_tasks())
            .finish()
    }
}

impl Scheduler {
    pub fn new(engine: Arc<QueryPerformanceEngine>) -> Self {
        Self {
            engine,
            state: Mutex::new(SchedulerState::Stopped),
            cancel: Mutex::new(CancellationToken::new()),
            handles: Mutex::new(Vec::new()),
            stop_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &Arc<QueryPerformanceEngine> {
        &self.engine
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Names of the loops spawned by the last [`start`](Self::start)
    pub fn running_tasks(&self) -> Vec<&'static str> {
        self.handles.lock().iter().map(|(name, _)| *name).collect()
    }

    /// Spawns the enabled loops and moves to `Running`.
    ///
    /// The live loop only runs when it is enabled and the engine has a
    /// source. Fails if the scheduler is not `Stopped` or if called outside
    /// a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != SchedulerState::Stopped {
            return Err(QlensError::Other(format!(
                "scheduler cannot start while {:?}",
                *state
            )));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| QlensError::Other(format!("scheduler needs a tokio runtime: {}", e)))?;

        let cancel = CancellationToken::new();
        let config = self.engine.config();
        let mut handles = Vec::with_capacity(3);

        if config.enable_live_loop && self.engine.has_source() {
            let engine = Arc::clone(&self.engine);
            handles.push((
                LIVE_TASK,
                runtime.spawn(run_loop(
                    LIVE_TASK,
                    config.live_loop_interval(),
                    cancel.clone(),
                    move || {
                        let engine = Arc::clone(&engine);
                        async move { engine.live_monitoring_pass().await.map(|_| ()) }
                    },
                )),
            ));
        } else if config.enable_live_loop {
            tracing::info!("live monitoring enabled but no execution source is configured");
        }

        let engine = Arc::clone(&self.engine);
        handles.push((
            PERIODIC_TASK,
            runtime.spawn(run_loop(
                PERIODIC_TASK,
                config.periodic_loop_interval(),
                cancel.clone(),
                move || {
                    let engine = Arc::clone(&engine);
                    async move { engine.periodic_analysis_pass().await.map(|_| ()) }
                },
            )),
        ));

        let engine = Arc::clone(&self.engine);
        handles.push((
            CLEANUP_TASK,
            runtime.spawn(run_loop(
                CLEANUP_TASK,
                config.cleanup_interval(),
                cancel.clone(),
                move || {
                    let engine = Arc::clone(&engine);
                    async move {
                        engine.cleanup_pass(Utc::now());
                        Ok(())
                    }
                },
            )),
        ));

        let tasks: Vec<&str> = handles.iter().map(|(name, _)| *name).collect();
        *self.cancel.lock() = cancel;
        *self.handles.lock() = handles;
        *state = SchedulerState::Running;
        tracing::info!(?tasks, "scheduler started");
        Ok(())
    }

    /// Cancels every loop and waits until all of them have exited.
    ///
    /// Safe to call repeatedly and concurrently; later callers wait for the
    /// first stop to finish.
    pub async fn stop(&self) {
        let _serial = self.stop_lock.lock().await;

        let handles = {
            let mut state = self.state.lock();
            if *state == SchedulerState::Stopped {
                return;
            }
            *state = SchedulerState::Stopping;
            self.cancel.lock().cancel();
            std::mem::take(&mut *self.handles.lock())
        };

        for (task, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!(task, error = %e, "loop task ended abnormally");
            }
        }

        *self.state.lock() = SchedulerState::Stopped;
        tracing::info!("scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel.lock().cancel();
    }
}
