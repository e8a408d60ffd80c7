//! Leadership gate: per-worker leader flag plus the subscriptions held
//! while leader.
//!
//! The flag is atomic so `do_work` can read it without locking. Every
//! transition, and every notification callback that acts on the flag, runs
//! inside the same lock. Once `lose_leadership` returns, no callback can
//! observe the worker as leader.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::store::{EntityStore, NotificationConfig, NotificationHandler, NotificationToken};

/// One notification interest a worker holds while leader.
#[derive(Clone)]
pub struct Interest {
    pub config: NotificationConfig,
    pub handler: Arc<dyn NotificationHandler>,
}

impl Interest {
    pub fn new(config: NotificationConfig, handler: Arc<dyn NotificationHandler>) -> Self {
        Self { config, handler }
    }
}

/// Ordered tokens owned by one worker.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    tokens: Vec<NotificationToken>,
}

impl SubscriptionSet {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[NotificationToken] {
        &self.tokens
    }
}

/// Leader flag and subscription set for a single worker.
#[derive(Debug)]
pub struct LeadershipGate {
    worker: String,
    is_leader: AtomicBool,
    subscriptions: Mutex<SubscriptionSet>,
}

impl LeadershipGate {
    pub fn new(worker: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            is_leader: AtomicBool::new(false),
            subscriptions: Mutex::new(SubscriptionSet::default()),
        }
    }

    /// Lock-free read of the most recent transition.
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Acquire)
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    /// Snapshot of the tokens currently held.
    pub async fn tokens(&self) -> Vec<NotificationToken> {
        self.subscriptions.lock().await.tokens().to_vec()
    }

    /// Become leader and subscribe every interest.
    ///
    /// Returns `Ok(false)` without touching the store if already leader. On a
    /// subscribe failure the tokens acquired so far are released and the
    /// worker stays a follower.
    pub async fn become_leader(
        &self,
        store: &dyn EntityStore,
        interests: &[Interest],
    ) -> Result<bool, StoreError> {
        let mut set = self.subscriptions.lock().await;
        if self.is_leader() {
            debug!(worker = %self.worker, "Duplicate leadership signal ignored");
            return Ok(false);
        }

        let mut acquired = Vec::with_capacity(interests.len());
        for interest in interests {
            match store
                .subscribe(interest.config.clone(), Arc::clone(&interest.handler))
                .await
            {
                Ok(token) => acquired.push(token),
                Err(e) => {
                    for token in acquired {
                        if let Err(release_err) = store.unsubscribe(token).await {
                            warn!(
                                worker = %self.worker,
                                error = %release_err,
                                "Failed to roll back subscription"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        set.tokens = acquired;
        self.is_leader.store(true, Ordering::Release);
        info!(
            worker = %self.worker,
            subscriptions = set.len(),
            "Became leader"
        );
        Ok(true)
    }

    /// Drop leadership and release every subscription.
    ///
    /// The flag is cleared before any token is released. All tokens are
    /// attempted even if one fails; the first failure is returned. A token
    /// the store refuses because it is disconnected already died with the
    /// connection and counts as released. The set is empty afterwards
    /// either way.
    pub async fn lose_leadership(&self, store: &dyn EntityStore) -> Result<bool, StoreError> {
        let mut set = self.subscriptions.lock().await;
        let was_leader = self.is_leader.swap(false, Ordering::AcqRel);

        let mut first_error = None;
        for token in std::mem::take(&mut set.tokens) {
            match store.unsubscribe(token).await {
                Ok(()) => {}
                Err(StoreError::Disconnected) => {
                    debug!(worker = %self.worker, "Subscription already voided by disconnect");
                }
                Err(e) => {
                    warn!(worker = %self.worker, error = %e, "Failed to release subscription");
                    first_error.get_or_insert(e);
                }
            }
        }

        if was_leader {
            info!(worker = %self.worker, "Lost leadership");
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(was_leader),
        }
    }

    /// Run `f` only if this worker is leader, inside the transition lock.
    ///
    /// Returns `None` when the worker is not leader.
    pub async fn while_leader<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        let _set = self.subscriptions.lock().await;
        if self.is_leader() { Some(f()) } else { None }
    }
}
