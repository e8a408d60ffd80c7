//! Clock worker: while leader, pushes the current time into every
//! `SystemClock` entity at a fixed interval.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::ClockConfig;
use crate::store::{EntityStore, Value};
use crate::worker::{LeadershipGate, Worker};

pub const CLOCK_ENTITY_TYPE: &str = "SystemClock";
pub const CURRENT_TIME_FIELD: &str = "CurrentTime";

/// Outcome of one sweep over the clock entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub pushed: usize,
    pub failed: usize,
}

pub struct ClockWorker {
    store: Arc<dyn EntityStore>,
    gate: LeadershipGate,
    update_interval: Duration,
    last_update: Mutex<Option<Instant>>,
}

impl ClockWorker {
    pub fn new(store: Arc<dyn EntityStore>, config: &ClockConfig) -> Self {
        Self {
            store,
            gate: LeadershipGate::new("clock"),
            update_interval: config.update_interval,
            last_update: Mutex::new(None),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.gate.is_leader()
    }

    /// Claim the current interval window. Returns `false` if the last sweep
    /// was less than one interval ago.
    fn claim_window(&self) -> bool {
        let now = Instant::now();
        let mut last = self
            .last_update
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if last.is_some_and(|t| now.duration_since(t) < self.update_interval) {
            return false;
        }
        *last = Some(now);
        true
    }

    /// Push a fresh timestamp to every clock entity. Per-entity failures are
    /// logged and skipped.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let clocks = match self.store.find_entities(CLOCK_ENTITY_TYPE).await {
            Ok(clocks) => clocks,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate clock entities");
                return report;
            }
        };

        for clock in &clocks {
            let now = Value::Timestamp(Utc::now());
            match self.store.push_field(clock, CURRENT_TIME_FIELD, now).await {
                Ok(()) => report.pushed += 1,
                Err(e) => {
                    warn!(entity = %clock, error = %e, "Failed to push clock time");
                    report.failed += 1;
                }
            }
        }

        debug!(pushed = report.pushed, failed = report.failed, "Clock sweep done");
        report
    }
}

#[async_trait]
impl Worker for ClockWorker {
    fn name(&self) -> &str {
        "clock"
    }

    async fn do_work(&self) {
        if !self.gate.is_leader() || !self.claim_window() {
            return;
        }
        self.sweep().await;
    }

    async fn on_became_leader(&self) {
        if let Err(e) = self.gate.become_leader(self.store.as_ref(), &[]).await {
            error!(worker = "clock", error = %e, "Failed to take leadership");
        }
    }

    async fn on_lost_leadership(&self) {
        if let Err(e) = self.gate.lose_leadership(self.store.as_ref()).await {
            error!(worker = "clock", error = %e, "Failed to release leadership");
        }
    }
}
