//! Scheduler entities: heap events, retry items, cancellation filters.

use std::cmp::Ordering;

/// One bundle waiting in the scheduler heap.
///
/// Ordered by `(ntp_time, seq)` ascending; `seq` is a per-scheduler strictly
/// increasing counter whose only job is FIFO tie-breaking among events that
/// share a timetag.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    /// Dispatch deadline in NTP seconds.
    pub ntp_time: f64,
    /// FIFO tie-break, assigned by the scheduler at insert.
    pub seq: u64,
    /// Producer-supplied session label for cancellation.
    pub session_id: u32,
    /// Producer-supplied run label for cancellation.
    pub run_tag: String,
    /// The bundle bytes to write to IN.
    pub payload: Vec<u8>,
    /// Originating producer, carried into the frame header.
    pub source_id: u32,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ntp_time.total_cmp(&other.ntp_time).then(self.seq.cmp(&other.seq))
    }
}

/// A message whose last IN write failed, parked for the next poll cycle.
#[derive(Debug, Clone)]
pub struct RetryItem {
    /// The frame payload.
    pub payload: Vec<u8>,
    /// Failed attempts so far.
    pub attempts: u32,
    /// Human-readable origin, carried into the drop report.
    pub context: String,
    /// NTP time at which the item entered the queue.
    pub queued_at: f64,
    /// Originating producer.
    pub source_id: u32,
}

/// Which heap events a cancellation removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelFilter {
    /// Events matching both labels.
    SessionTag {
        /// Session label to match.
        session_id: u32,
        /// Run label to match.
        run_tag: String,
    },
    /// Events matching the session label.
    Session(u32),
    /// Events matching the run label.
    Tag(String),
    /// Every event.
    All,
}

impl CancelFilter {
    /// True when the filter selects this event for removal.
    pub fn matches(&self, event: &ScheduledEvent) -> bool {
        match self {
            Self::SessionTag { session_id, run_tag } => {
                event.session_id == *session_id && event.run_tag == *run_tag
            }
            Self::Session(session_id) => event.session_id == *session_id,
            Self::Tag(run_tag) => event.run_tag == *run_tag,
            Self::All => true,
        }
    }
}
