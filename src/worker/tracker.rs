//! In-flight task tracking for fire-and-forget work.
//!
//! Spawned tasks run independently of the caller. The tracker only counts
//! them, so shutdown and tests can wait for them deterministically and a
//! cancelled wait loses nothing.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Running {
    count: AtomicUsize,
    idle: Notify,
}

/// Ends one task's share of the running count, panicked or not.
struct RunningGuard(Arc<Running>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::warn!("Tracked task panicked");
        }
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Tracks spawned tasks until they finish.
#[derive(Debug, Default)]
pub struct DispatchTracker {
    running: Arc<Running>,
}

impl DispatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` on the runtime and track it.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.running.count.fetch_add(1, Ordering::AcqRel);
        let guard = RunningGuard(Arc::clone(&self.running));
        tokio::spawn(async move {
            let _guard = guard;
            task.await;
        });
    }

    /// Number of spawned tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.running.count.load(Ordering::Acquire)
    }

    /// Wait until every tracked task, including ones spawned while waiting,
    /// has finished.
    pub async fn wait_idle(&self) {
        loop {
            // Register before checking so a wakeup between the two is kept.
            let idle = self.running.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            idle.await;
        }
    }
}
