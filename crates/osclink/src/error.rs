//! Error types for link operations.

use oscring::WriteError;
use thiserror::Error;

/// Errors surfaced by the producer API and the scheduler.
#[derive(Debug, Clone, Error)]
pub enum LinkError {
    /// A ring write failed and was not worth retrying.
    #[error("ring write failed: {0}")]
    Write(#[from] WriteError),

    /// The scheduler's combined heap + retry depth hit the pending cap.
    #[error("scheduler backpressure: {pending} pending at cap {cap}")]
    Backpressure {
        /// Depth at rejection time.
        pending: usize,
        /// The configured cap.
        cap: usize,
    },

    /// A retried message was dropped after the attempt cap.
    #[error("retries exhausted after {attempts} attempts ({context})")]
    RetriesExhausted {
        /// Failed attempts at drop time.
        attempts: u32,
        /// Where the message came from.
        context: String,
    },

    /// The scheduler task is gone.
    #[error("scheduler is shut down")]
    SchedulerDown,

    /// The consumer endpoint was already handed out.
    #[error("engine endpoint already taken")]
    EngineTaken,
}

impl LinkError {
    /// Returns `true` when the link is permanently unusable.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SchedulerDown | Self::Write(WriteError::Detached))
    }
}
