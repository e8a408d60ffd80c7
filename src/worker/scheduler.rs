//! Cooperative worker scheduler.
//!
//! One task drives every registered worker: `init` in registration order,
//! then one `do_work` per worker per tick, then `deinit` in registration
//! order once the quit signal fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::worker::quit::{QuitReason, QuitSignal};
use crate::worker::worker::Worker;

/// Shortest tick the scheduler will run at.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Drives a fixed set of workers until quit.
pub struct WorkerScheduler {
    workers: Vec<Arc<dyn Worker>>,
    tick_interval: Duration,
    quit: QuitSignal,
}

impl WorkerScheduler {
    /// `tick_interval` is raised to [`MIN_TICK_INTERVAL`] if shorter.
    pub fn new(tick_interval: Duration, quit: QuitSignal) -> Self {
        Self {
            workers: Vec::new(),
            tick_interval: tick_interval.max(MIN_TICK_INTERVAL),
            quit,
        }
    }

    /// Register a worker. Order of registration is the order of every phase.
    pub fn register(&mut self, worker: Arc<dyn Worker>) -> &mut Self {
        debug!(worker = worker.name(), "Worker registered");
        self.workers.push(worker);
        self
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Handle to the quit signal this scheduler stops on.
    pub fn quit_signal(&self) -> QuitSignal {
        self.quit.clone()
    }

    /// Call `do_work` once on every worker, stopping early if quit fires.
    pub async fn tick(&self) {
        for worker in &self.workers {
            if self.quit.is_fired() {
                return;
            }
            worker.do_work().await;
        }
    }

    /// Run init, the tick loop, and deinit. Returns why the loop stopped.
    pub async fn run(self) -> QuitReason {
        info!(
            workers = self.workers.len(),
            tick_ms = self.tick_interval.as_millis() as u64,
            "Scheduler starting"
        );

        for worker in &self.workers {
            debug!(worker = worker.name(), "Initializing worker");
            worker.init().await;
        }

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.quit.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }

        let reason = self.quit.reason().cloned().unwrap_or(QuitReason::Shutdown);
        info!(%reason, "Scheduler stopping");

        for worker in &self.workers {
            debug!(worker = worker.name(), "Deinitializing worker");
            worker.deinit().await;
        }

        reason
    }
}
