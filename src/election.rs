//! Standalone leader election.
//!
//! Arbitrates leadership for a single process: the process is leader exactly
//! while every availability criterion holds. Transitions are edge-triggered
//! and fanned out to listeners in registration order. Multi-replica
//! contention is left to an external election backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::worker::Worker;

type Criterion = Box<dyn Fn() -> bool + Send + Sync>;

#[derive(Default)]
pub struct LeaderElectionWorker {
    listeners: Vec<Arc<dyn Worker>>,
    criteria: Vec<Criterion>,
    is_leader: AtomicBool,
}

impl LeaderElectionWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker to receive leadership transitions.
    pub fn add_listener(&mut self, listener: Arc<dyn Worker>) -> &mut Self {
        self.listeners.push(listener);
        self
    }

    /// Leadership is only held while every criterion returns `true`.
    pub fn add_availability_criteria<F>(&mut self, criterion: F) -> &mut Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.criteria.push(Box::new(criterion));
        self
    }

    pub fn is_available(&self) -> bool {
        self.criteria.iter().all(|criterion| criterion())
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Acquire)
    }

    async fn became_leader(&self) {
        info!(listeners = self.listeners.len(), "Became leader");
        for listener in &self.listeners {
            listener.on_became_leader().await;
        }
    }

    async fn lost_leadership(&self) {
        for listener in &self.listeners {
            listener.on_lost_leadership().await;
        }
    }

    /// Give up leadership, if held.
    pub async fn release(&self) {
        if self.is_leader.swap(false, Ordering::AcqRel) {
            info!("Releasing leadership");
            self.lost_leadership().await;
        }
    }
}

#[async_trait]
impl Worker for LeaderElectionWorker {
    fn name(&self) -> &str {
        "leader-election"
    }

    async fn deinit(&self) {
        self.release().await;
    }

    async fn do_work(&self) {
        let available = self.is_available();
        if available && !self.is_leader.swap(true, Ordering::AcqRel) {
            self.became_leader().await;
        } else if !available && self.is_leader.swap(false, Ordering::AcqRel) {
            warn!("Availability criteria no longer met, losing leadership");
            self.lost_leadership().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Listener {
        events: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl Worker for Listener {
        fn name(&self) -> &str {
            "listener"
        }

        async fn on_became_leader(&self) {
            self.events.lock().unwrap().push("became");
        }

        async fn on_lost_leadership(&self) {
            self.events.lock().unwrap().push("lost");
        }
    }

    fn election(available: &Arc<AtomicBool>, listener: &Arc<Listener>) -> LeaderElectionWorker {
        let mut election = LeaderElectionWorker::new();
        let flag = Arc::clone(available);
        election
            .add_listener(listener.clone())
            .add_availability_criteria(move || flag.load(Ordering::SeqCst));
        election
    }

    #[tokio::test]
    async fn fires_only_on_edges() {
        let available = Arc::new(AtomicBool::new(false));
        let listener = Arc::new(Listener::default());
        let election = election(&available, &listener);

        election.do_work().await;
        assert!(!election.is_leader());

        available.store(true, Ordering::SeqCst);
        election.do_work().await;
        election.do_work().await;
        assert!(election.is_leader());

        available.store(false, Ordering::SeqCst);
        election.do_work().await;
        election.do_work().await;
        assert!(!election.is_leader());

        assert_eq!(*listener.events.lock().unwrap(), vec!["became", "lost"]);
    }

    #[tokio::test]
    async fn deinit_releases_leadership() {
        let available = Arc::new(AtomicBool::new(true));
        let listener = Arc::new(Listener::default());
        let election = election(&available, &listener);

        election.do_work().await;
        election.deinit().await;
        election.deinit().await;

        assert!(!election.is_leader());
        assert_eq!(*listener.events.lock().unwrap(), vec!["became", "lost"]);
    }

    #[test]
    fn no_criteria_means_available() {
        assert!(LeaderElectionWorker::new().is_available());
    }
}
