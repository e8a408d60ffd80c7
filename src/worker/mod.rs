//! Worker system: leader-gated workers driven by a cooperative scheduler.
//!
//! Core components:
//! - `worker`: the `Worker` trait (init, deinit, do_work, leadership callbacks)
//! - `leadership`: per-worker leader flag and subscription set
//! - `quit`: single-fire process quit signal
//! - `tracker`: tracking for spawned fire-and-forget tasks
//! - `scheduler`: tick loop over all registered workers

pub mod leadership;
pub mod quit;
pub mod scheduler;
pub mod tracker;
pub mod worker;

pub use leadership::{Interest, LeadershipGate, SubscriptionSet};
pub use quit::{QuitReason, QuitSignal};
pub use scheduler::WorkerScheduler;
pub use tracker::DispatchTracker;
pub use worker::Worker;
