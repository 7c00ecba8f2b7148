use thiserror::Error;

/// Error types for ring write operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteError {
    /// The IN write lock could not be acquired within the spin budget.
    #[error("write lock busy after spin budget")]
    Busy,

    /// The ring does not currently have room for the frame.
    #[error("ring full: need {need} bytes, {free} free")]
    Full {
        /// Bytes the frame would consume, including any skipped run-out.
        need: u32,
        /// Free bytes at the time of the attempt.
        free: u32,
    },

    /// The frame could never fit, even in an empty ring.
    #[error("payload oversize: aligned frame of {aligned} bytes exceeds limit {limit}")]
    Oversize {
        /// Aligned frame length (header + payload, rounded up).
        aligned: u32,
        /// Largest aligned frame the ring accepts.
        limit: u32,
    },

    /// The transport behind this writer is gone (fallback pump stopped).
    #[error("transport detached")]
    Detached,
}

impl WriteError {
    /// Returns `true` for transient conditions worth queueing for retry.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::Full { .. })
    }
}
