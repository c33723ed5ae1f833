//! Background re-resolution of tracked callers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::resolver::DynamicPermissionResolver;

/// Handle to the refresh task. Dropping it leaves the task running.
#[derive(Debug)]
pub struct RefreshHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stops the task and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns a task that refreshes every tracked caller once per refresh
/// interval. Must be called inside a tokio runtime.
pub fn spawn_refresh(resolver: Arc<DynamicPermissionResolver>) -> RefreshHandle {
    let period = Duration::from_secs(resolver.config().refresh_interval_seconds.max(1));
    let (shutdown, mut stop) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        info!(period_secs = period.as_secs(), "dynamic permission refresh started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = resolver.refresh_tracked(Utc::now()).await;
                    debug!(
                        refreshed = summary.refreshed,
                        failed = summary.failed,
                        untracked = summary.untracked,
                        "refresh cycle complete"
                    );
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        info!("dynamic permission refresh stopped");
    });

    RefreshHandle { shutdown, task }
}
