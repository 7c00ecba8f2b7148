//! Named, serializable view of the metrics slots.

use oscring::Counter;
use serde::Serialize;

/// A decoded metrics snapshot with one named field per published slot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsReport {
    /// Successful IN writes, any origin.
    pub osc_out_messages_sent: u32,
    /// Aggregate bypass count.
    pub prescheduler_bypassed: u32,
    /// Plain-message bypasses.
    pub bypass_non_bundle: u32,
    /// Immediate-timetag bypasses.
    pub bypass_immediate: u32,
    /// Near-future bypasses.
    pub bypass_near_future: u32,
    /// Late bypasses.
    pub bypass_late: u32,
    /// Bundles accepted into the heap.
    pub bundles_scheduled: u32,
    /// Heap events dispatched.
    pub total_dispatches: u32,
    /// Retries requested.
    pub retries_requested: u32,
    /// Retries that landed.
    pub retries_succeeded: u32,
    /// Retries dropped at the attempt cap.
    pub retries_exhausted: u32,
    /// Heap events cancelled.
    pub events_cancelled: u32,
    /// Submissions rejected at the pending cap.
    pub backpressure_rejected: u32,
    /// Oversize payloads dropped.
    pub oversize_dropped: u32,
    /// Current heap depth.
    pub pending_depth: u32,
    /// Peak heap depth.
    pub pending_depth_peak: u32,
    /// Current retry depth.
    pub retry_depth: u32,
    /// Peak retry depth.
    pub retry_depth_peak: u32,
    /// IN frames drained by the consumer.
    pub messages_processed: u32,
    /// OUT frames written.
    pub replies_sent: u32,
    /// DEBUG frames written.
    pub debug_written: u32,
    /// Frames lost to corruption or gaps.
    pub dropped_messages: u32,
    /// Corrupt headers seen.
    pub corrupt_frames: u32,
    /// Small sequence gaps seen.
    pub sequence_gaps: u32,
}

impl MetricsReport {
    /// Decodes a raw slot snapshot (as returned by
    /// [`Producer::metrics_array`](crate::Producer::metrics_array)).
    pub fn from_snapshot(slots: &[u32]) -> Self {
        let get = |c: Counter| slots.get(c as u32 as usize).copied().unwrap_or(0);
        Self {
            osc_out_messages_sent: get(Counter::OscOutMessagesSent),
            prescheduler_bypassed: get(Counter::PreschedulerBypassed),
            bypass_non_bundle: get(Counter::BypassNonBundle),
            bypass_immediate: get(Counter::BypassImmediate),
            bypass_near_future: get(Counter::BypassNearFuture),
            bypass_late: get(Counter::BypassLate),
            bundles_scheduled: get(Counter::BundlesScheduled),
            total_dispatches: get(Counter::TotalDispatches),
            retries_requested: get(Counter::RetriesRequested),
            retries_succeeded: get(Counter::RetriesSucceeded),
            retries_exhausted: get(Counter::RetriesExhausted),
            events_cancelled: get(Counter::EventsCancelled),
            backpressure_rejected: get(Counter::BackpressureRejected),
            oversize_dropped: get(Counter::OversizeDropped),
            pending_depth: get(Counter::PendingDepth),
            pending_depth_peak: get(Counter::PendingDepthPeak),
            retry_depth: get(Counter::RetryDepth),
            retry_depth_peak: get(Counter::RetryDepthPeak),
            messages_processed: get(Counter::MessagesProcessed),
            replies_sent: get(Counter::RepliesSent),
            debug_written: get(Counter::DebugWritten),
            dropped_messages: get(Counter::DroppedMessages),
            corrupt_frames: get(Counter::CorruptFrames),
            sequence_gaps: get(Counter::SequenceGaps),
        }
    }
}
