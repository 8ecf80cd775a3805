//! Fault-isolated periodic loop

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use qlens_core::{QlensError, Result};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Runs `iteration` on every tick of `period` until `cancel` fires.
///
/// The first tick is immediate. Errors and panics inside one iteration are
/// logged and the loop waits for its next tick; missed ticks are skipped
/// rather than replayed. Cancellation also abandons an in-flight iteration.
pub(crate) async fn run_loop<F, Fut>(
    task: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut iteration: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::debug!(task, ?period, "loop started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let span = tracing::info_span!("scheduler_loop", task);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = AssertUnwindSafe(iteration()).catch_unwind().instrument(span) => outcome,
        };

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let err = QlensError::Loop(format!("{} iteration failed: {}", task, e));
                tracing::error!(task, error = %err, "loop iteration failed");
            }
            Err(panic) => {
                let err = QlensError::Loop(format!(
                    "{} iteration panicked: {}",
                    task,
                    panic_message(panic.as_ref())
                ));
                tracing::error!(task, error = %err, "loop iteration panicked");
            }
        }
    }

    tracing::debug!(task, "loop exited");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
