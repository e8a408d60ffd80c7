//! The `Worker` trait driven by the scheduler and the leader election.

use async_trait::async_trait;

/// A unit of business logic run by the [`WorkerScheduler`](super::WorkerScheduler).
///
/// `init`, `do_work` and `deinit` are called sequentially from the scheduler
/// task. The leadership callbacks come from the election and may run
/// concurrently with `do_work`, so implementations keep their leader state
/// behind a [`LeadershipGate`](super::LeadershipGate).
///
/// `do_work` must be bounded: anything that can block indefinitely belongs on
/// a spawned task.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn init(&self) {}

    async fn deinit(&self) {}

    async fn do_work(&self) {}

    async fn on_became_leader(&self) {}

    async fn on_lost_leadership(&self) {}
}
