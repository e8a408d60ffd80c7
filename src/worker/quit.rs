//! Process-wide quit signal.
//!
//! Owned by the scheduler and handed to every worker at construction time.
//! The first `fire` wins; later calls are ignored.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Why the process is stopping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuitReason {
    /// Orderly stop (OS signal or caller request).
    Shutdown,
    /// A worker escalated a failure; a supervised restart is expected.
    Failure(String),
}

impl QuitReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

impl fmt::Display for QuitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => write!(f, "shutdown"),
            Self::Failure(reason) => write!(f, "failure: {reason}"),
        }
    }
}

/// Single-fire cancellation signal shared by the scheduler and its workers.
#[derive(Debug, Clone, Default)]
pub struct QuitSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<QuitReason>>,
}

impl QuitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns `true` only for the call that actually fired it.
    pub fn fire(&self, reason: QuitReason) -> bool {
        match self.reason.set(reason) {
            Ok(()) => {
                if let Some(reason) = self.reason.get() {
                    tracing::warn!(%reason, "Quit signal fired");
                }
                self.token.cancel();
                true
            }
            Err(ignored) => {
                tracing::debug!(reason = %ignored, "Quit signal already fired, ignoring");
                false
            }
        }
    }

    /// Escalate a failure.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.fire(QuitReason::Failure(reason.into()))
    }

    /// Request an orderly stop.
    pub fn shutdown(&self) -> bool {
        self.fire(QuitReason::Shutdown)
    }

    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Reason recorded by the first `fire`.
    pub fn reason(&self) -> Option<&QuitReason> {
        self.reason.get()
    }

    /// Completes once the signal has fired.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
