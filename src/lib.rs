//! Leader-gated workers: singleton side effects in a replicated fleet.

pub mod clock;
pub mod config;
pub mod election;
pub mod email;
pub mod error;
pub mod schema;
pub mod store;
pub mod worker;
