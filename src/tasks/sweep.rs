//! Expiration Sweep Task
//!
//! Background task that periodically removes expired entries from both
//! cache tiers, independent of request traffic.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::{CacheEngine, SweepReport};

/// Handle to the running sweep task.
///
/// Dropping the handle aborts the task; [`SweepHandle::stop`] lets an
/// in-progress sweep finish first.
#[derive(Debug)]
pub struct SweepHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Signals the task to stop and waits for it to exit.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(err) = (&mut self.task).await {
            if !err.is_cancelled() {
                warn!(error = %err, "Sweep task ended abnormally");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns the task that sweeps expired entries every `interval`.
///
/// The first sweep runs one full interval after the call.
///
/// # Example
/// ```ignore
/// let sweeper = spawn_sweep_task(cache.clone(), Duration::from_secs(300));
/// // Later, during shutdown:
/// sweeper.stop().await;
/// ```
pub fn spawn_sweep_task(cache: Arc<CacheEngine>, interval: Duration) -> SweepHandle {
    let (shutdown, mut stopped) = oneshot::channel();

    let task = tokio::spawn(async move {
        info!(interval_secs = interval.as_secs_f64(), "Starting expiration sweep task");

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut stopped => {
                    debug!("Expiration sweep task stopping");
                    break;
                }
                _ = ticker.tick() => {
                    run_sweep(&cache).await;
                }
            }
        }
    });

    SweepHandle {
        shutdown: Some(shutdown),
        task,
    }
}

/// Runs one sweep and logs its outcome.
pub async fn run_sweep(cache: &CacheEngine) -> Option<SweepReport> {
    match cache.clear_expired().await {
        Ok(report) => {
            if report.memory > 0 || report.persistent > 0 {
                info!(
                    memory = report.memory,
                    persistent = report.persistent,
                    "Expiration sweep removed entries"
                );
            } else {
                debug!("Expiration sweep: no expired entries found");
            }
            Some(report)
        }
        Err(err) => {
            warn!(error = %err, "Expiration sweep failed");
            None
        }
    }
}
