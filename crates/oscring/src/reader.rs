//! Reader drain state.
//!
//! A [`RingDrain`] owns one tail pointer: it acquires the ring's head, walks
//! frames with [`crate::frame::read_frames`], and publishes the new tail with
//! release semantics. Corruption is survived by byte-level resync; losses are
//! charged to the dropped counter from sequence gaps, but only when the gap
//! is small enough to be trustworthy. A gap of a thousand or more means the
//! sequence field itself was parsed out of reused bytes, and charging it
//! would swamp the counter with garbage.

use crate::frame::{self, FrameInfo};
use crate::invariants::debug_assert_frame_len;
use crate::layout::{ctl, status, RingKind};
use crate::metrics::Counter;
use crate::region::SharedRegion;
use crossbeam_utils::CachePadded;
use std::cell::{Cell, RefCell};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Sequence deltas at or above this are ignored rather than charged as
/// losses.
pub const GAP_TRUST_LIMIT: u32 = 1000;

struct DrainState {
    last_sequence: Cell<Option<u32>>,
    scratch: RefCell<Vec<u8>>,
}

/// Single-reader drain over one ring's tail pointer.
///
/// `!Sync` on purpose: exactly one context owns each tail.
pub struct RingDrain {
    region: Arc<SharedRegion>,
    kind: RingKind,
    tail_word: usize,
    max_frames: usize,
    state: CachePadded<DrainState>,
}

impl RingDrain {
    /// Creates the drain that owns the ring's primary tail.
    pub fn new(region: Arc<SharedRegion>, kind: RingKind, max_frames: usize) -> Self {
        Self {
            region,
            kind,
            tail_word: kind.tail_word(),
            max_frames,
            state: CachePadded::new(DrainState {
                last_sequence: Cell::new(None),
                scratch: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Creates the send-log observer drain over IN.
    ///
    /// The observer's tail starts at the current head (only frames written
    /// from now on are observed) and the IN writer starts honouring it for
    /// free-space accounting.
    pub fn log_observer(region: Arc<SharedRegion>, max_frames: usize) -> Self {
        let head = region.control(ctl::IN_HEAD).load(Ordering::Acquire);
        region.control(ctl::IN_LOG_TAIL).store(head, Ordering::Release);
        region.status_set(status::LOG_DRAIN);

        Self {
            region,
            kind: RingKind::In,
            tail_word: ctl::IN_LOG_TAIL,
            max_frames,
            state: CachePadded::new(DrainState {
                last_sequence: Cell::new(None),
                scratch: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Current head as published by the writer side.
    pub fn observed_head(&self) -> u32 {
        self.region.control(self.kind.head_word()).load(Ordering::Acquire)
    }

    /// True when there is nothing to drain right now.
    pub fn is_idle(&self) -> bool {
        self.observed_head() == self.region.control(self.tail_word).load(Ordering::Relaxed)
    }

    /// Walks available frames, invoking `handler` per frame, then publishes
    /// the new tail. Returns the number of frames delivered.
    pub fn drain(&self, mut handler: impl FnMut(&[u8], FrameInfo)) -> usize {
        let head = self.observed_head();
        let tail = self.region.control(self.tail_word).load(Ordering::Relaxed);
        if head == tail {
            return 0;
        }

        let metrics = self.region.metrics();
        let ring = self.region.ring(self.kind);
        let ring_len = ring.len();
        let mut scratch = self.state.scratch.borrow_mut();
        let last = &self.state.last_sequence;

        let outcome = frame::read_frames(
            &ring,
            head,
            tail,
            self.kind,
            self.max_frames,
            &mut scratch,
            |payload, info| {
                debug_assert_frame_len!(info.length, ring_len);
                if let Some(prev) = last.get() {
                    let expected = prev.wrapping_add(1);
                    let delta = info.sequence.wrapping_sub(expected);
                    if delta != 0 && delta < GAP_TRUST_LIMIT {
                        metrics.add(Counter::DroppedMessages, delta);
                        metrics.incr(Counter::SequenceGaps);
                    }
                }
                last.set(Some(info.sequence));
                handler(payload, info);
            },
            |_offset| {
                metrics.incr(Counter::CorruptFrames);
                metrics.incr(Counter::DroppedMessages);
            },
        );

        self.region.control(self.tail_word).store(outcome.tail, Ordering::Release);
        outcome.frames
    }
}
