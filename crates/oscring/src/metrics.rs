//! The metrics counter region.
//!
//! A fixed array of u32 slots at a published offset. The consumer and the
//! producers increment slots with atomic adds; readers snapshot the whole
//! array. In the message-forwarding fallback the producer side accumulates
//! into plain-u64 [`LocalCounters`] instead (no atomics, no cache traffic)
//! and ships deltas to the region owner, who folds them in here.

use crate::region::SharedRegion;
use std::sync::atomic::Ordering;

/// Number of u32 counter slots in the METRICS segment. Larger than the
/// named set so the schema can grow without moving the node tree.
pub const COUNTER_SLOTS: usize = 64;

/// Named counter slots. The discriminant is the slot index; indices are part
/// of the published schema and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Counter {
    /// Successful IN writes, regardless of origin (bypass, scheduler, retry).
    OscOutMessagesSent = 0,
    /// Aggregate of the four bypass classes below.
    PreschedulerBypassed = 1,
    /// Plain (non-bundle) payloads written straight to IN.
    BypassNonBundle = 2,
    /// Bundles whose raw timetag was 0 or 1.
    BypassImmediate = 3,
    /// Bundles due within the producer's bypass lookahead.
    BypassNearFuture = 4,
    /// Bundles whose timetag already passed.
    BypassLate = 5,
    /// Bundles accepted into the scheduler heap.
    BundlesScheduled = 6,
    /// Heap events dispatched to IN.
    TotalDispatches = 7,
    /// Messages queued for retry after a transient write failure.
    RetriesRequested = 8,
    /// Retry-queue items that eventually reached IN.
    RetriesSucceeded = 9,
    /// Retry-queue items dropped after the attempt cap.
    RetriesExhausted = 10,
    /// Heap events removed by cancellation predicates.
    EventsCancelled = 11,
    /// Submissions rejected because heap + retry hit the pending cap.
    BackpressureRejected = 12,
    /// Payloads dropped because they could never fit the ring.
    OversizeDropped = 13,
    /// Current heap depth (gauge).
    PendingDepth = 14,
    /// High-water heap depth.
    PendingDepthPeak = 15,
    /// Current retry-queue depth (gauge).
    RetryDepth = 16,
    /// High-water retry-queue depth.
    RetryDepthPeak = 17,
    /// Frames drained from IN by the audio consumer.
    MessagesProcessed = 18,
    /// Frames the consumer wrote to OUT.
    RepliesSent = 19,
    /// Frames the consumer wrote to DEBUG.
    DebugWritten = 20,
    /// Frames lost to corruption or sequence gaps, as seen by drains.
    DroppedMessages = 21,
    /// Corrupt frame headers encountered by drains.
    CorruptFrames = 22,
    /// Distinct small sequence gaps observed by drains.
    SequenceGaps = 23,
}

impl Counter {
    #[inline]
    pub(crate) fn slot(self) -> usize {
        self as u32 as usize
    }
}

/// Atomic view over the metrics slots of a region.
#[derive(Clone, Copy)]
pub struct MetricsView<'a> {
    region: &'a SharedRegion,
}

impl<'a> MetricsView<'a> {
    pub(crate) fn new(region: &'a SharedRegion) -> Self {
        Self { region }
    }

    #[inline]
    fn offset(&self, slot: usize) -> usize {
        debug_assert!(slot < COUNTER_SLOTS);
        self.region.layout().metrics.offset + slot * 4
    }

    /// Adds `n` to a counter.
    #[inline]
    pub fn add(&self, counter: Counter, n: u32) {
        self.region.atomic(self.offset(counter.slot())).fetch_add(n, Ordering::Relaxed);
    }

    /// Increments a counter by one.
    #[inline]
    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    /// Stores a gauge value.
    #[inline]
    pub fn set(&self, counter: Counter, value: u32) {
        self.region.atomic(self.offset(counter.slot())).store(value, Ordering::Relaxed);
    }

    /// Raises a high-water slot to at least `value`.
    #[inline]
    pub fn raise(&self, counter: Counter, value: u32) {
        self.region.atomic(self.offset(counter.slot())).fetch_max(value, Ordering::Relaxed);
    }

    /// Reads one counter.
    #[inline]
    pub fn get(&self, counter: Counter) -> u32 {
        self.region.atomic(self.offset(counter.slot())).load(Ordering::Relaxed)
    }

    /// Snapshots every slot, named and spare alike.
    pub fn snapshot(&self) -> Vec<u32> {
        (0..COUNTER_SLOTS)
            .map(|slot| self.region.atomic(self.offset(slot)).load(Ordering::Relaxed))
            .collect()
    }
}

/// Plain-u64 counter accumulator for contexts without shared memory.
///
/// No atomics: a producer owns its accumulator outright and periodically
/// drains it towards the region owner, who applies the deltas with
/// [`MetricsView::add`]. Sums stay exact because shipping drains the slots.
#[derive(Debug, Clone)]
pub struct LocalCounters {
    slots: [u64; COUNTER_SLOTS],
}

impl Default for LocalCounters {
    fn default() -> Self {
        Self { slots: [0; COUNTER_SLOTS] }
    }
}

impl LocalCounters {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` to a counter.
    #[inline]
    pub fn add(&mut self, counter: Counter, n: u32) {
        self.slots[counter.slot()] += u64::from(n);
    }

    /// Increments a counter by one.
    #[inline]
    pub fn incr(&mut self, counter: Counter) {
        self.add(counter, 1);
    }

    /// Reads one counter.
    #[inline]
    pub fn get(&self, counter: Counter) -> u64 {
        self.slots[counter.slot()]
    }

    /// True when every slot is zero.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|&v| v == 0)
    }

    /// Drains the accumulated deltas, leaving this accumulator empty.
    pub fn take(&mut self) -> LocalCounters {
        std::mem::take(self)
    }

    /// Folds the accumulated deltas into a region's metrics slots.
    pub fn apply_to(&self, view: &MetricsView<'_>) {
        for (slot, &v) in self.slots.iter().enumerate() {
            if v > 0 {
                view.region.atomic(view.offset(slot)).fetch_add(v as u32, Ordering::Relaxed);
            }
        }
    }
}
