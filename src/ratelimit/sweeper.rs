//! Background task that resets expired windows.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use super::limiter::SweepStats;
use super::registry::LimiterRegistry;

/// Periodically sweeps a registry.
pub struct ExpirySweeper {
    registry: Arc<LimiterRegistry>,
    interval: Duration,
}

impl ExpirySweeper {
    /// Create a sweeper ticking every `interval`.
    pub fn new(registry: Arc<LimiterRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Run a single sweep pass.
    pub fn tick(&self) -> SweepStats {
        let stats = self.registry.sweep();

        if stats.is_noop() {
            trace!(inspected = stats.inspected, "Sweep tick");
        } else {
            debug!(
                inspected = stats.inspected,
                reset = stats.reset,
                evicted = stats.evicted,
                "Sweep tick reset expired counters"
            );
        }
        stats
    }

    /// Spawn the sweep loop on the current tokio runtime.
    ///
    /// Late ticks are skipped rather than bunched up. The loop only ends on
    /// [`SweeperHandle::shutdown`]; dropping the handle detaches it and the
    /// sweep keeps running for the life of the runtime.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        info!(interval = ?self.interval, "Starting expiry sweeper");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut detached = false;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick();
                    }
                    changed = shutdown_rx.changed(), if !detached => {
                        match changed {
                            Ok(()) if *shutdown_rx.borrow() => break,
                            Ok(()) => {}
                            Err(_) => {
                                debug!("Sweeper handle dropped, sweeping until runtime exit");
                                detached = true;
                            }
                        }
                    }
                }
            }

            info!("Expiry sweeper stopped");
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running sweep loop.
///
/// Dropping it leaves the loop running; only `shutdown` stops it.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Whether the loop is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
