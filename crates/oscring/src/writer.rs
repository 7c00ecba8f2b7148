//! Ring write protocols.
//!
//! Two writers share the positional frame code in [`crate::frame`]:
//!
//! - [`InWriter`] serves any number of producer threads. Mutual exclusion is
//!   a single CAS lock word in the control block, held only for the copy and
//!   the head publish. Sequence numbers are taken under the lock, so
//!   successful writes are gap-free and the drain can charge real losses.
//! - [`ReplyWriter`] serves the audio consumer, which is the only writer of
//!   OUT and DEBUG by construction. No lock; the drain-side tail is cached
//!   and refreshed only when space looks tight.
//!
//! # Memory ordering
//!
//! The release store of `head` happens after every payload byte store, and a
//! reader that acquires `head` and sees the new value therefore sees the
//! whole frame. The lock acquire/release brackets give writers a total
//! order; readers never take the lock.

use crate::backoff::Backoff;
use crate::error::WriteError;
use crate::frame::{self, HEADER_LEN};
use crate::invariants::{debug_assert_lock_word, debug_assert_ring_pos};
use crate::layout::{ctl, status, RingKind};
use crate::metrics::Counter;
use crate::region::SharedRegion;
use crossbeam_utils::CachePadded;
use std::cell::Cell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Releases the IN write lock on every exit path.
struct LockGuard<'a>(&'a AtomicU32);

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.0.store(0, Ordering::Release);
    }
}

/// Multi-producer writer for the IN ring.
#[derive(Clone)]
pub struct InWriter {
    region: Arc<SharedRegion>,
}

impl InWriter {
    /// Creates a writer over the region's IN ring.
    pub fn new(region: Arc<SharedRegion>) -> Self {
        Self { region }
    }

    /// Largest aligned frame this ring accepts.
    #[inline]
    pub fn frame_limit(&self) -> usize {
        self.region.layout().in_ring.len - HEADER_LEN
    }

    /// Appends one frame to IN, tagged with the producer's source id.
    ///
    /// Non-blocking apart from a bounded spin on the write lock. Returns the
    /// frame's sequence number on success.
    pub fn try_write(&self, payload: &[u8], source_id: u32) -> Result<u32, WriteError> {
        let ring_len = self.region.layout().in_ring.len;
        let aligned = frame::aligned_len(payload.len());
        if aligned > ring_len - HEADER_LEN {
            self.region.metrics().incr(Counter::OversizeDropped);
            return Err(WriteError::Oversize {
                aligned: aligned as u32,
                limit: (ring_len - HEADER_LEN) as u32,
            });
        }

        let lock = self.region.control(ctl::IN_WRITE_LOCK);
        let mut backoff = Backoff::new();
        loop {
            match lock.compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed) {
                Ok(_) => break,
                Err(held) => {
                    debug_assert_lock_word!(held);
                    if backoff.is_completed() {
                        return Err(WriteError::Busy);
                    }
                    backoff.snooze();
                }
            }
        }
        let _guard = LockGuard(lock);

        let head = self.region.control(ctl::IN_HEAD).load(Ordering::Acquire);
        let tail = self.region.control(ctl::IN_TAIL).load(Ordering::Acquire);
        debug_assert_ring_pos!("IN head", head, ring_len);
        debug_assert_ring_pos!("IN tail", tail, ring_len);

        let mut free = frame::free_bytes(ring_len, head, tail);
        if self.region.status_has(status::LOG_DRAIN) {
            // The send-log observer lags behind IN_TAIL; its unread frames
            // must not be overwritten either.
            let log_tail = self.region.control(ctl::IN_LOG_TAIL).load(Ordering::Acquire);
            free = free.min(frame::free_bytes(ring_len, head, log_tail));
        }

        let need = frame::required_space(ring_len, head, aligned);
        if free < need {
            return Err(WriteError::Full { need: need as u32, free: free as u32 });
        }

        let sequence = self.region.control(ctl::IN_SEQ).fetch_add(1, Ordering::AcqRel);
        let new_head = frame::write_frame(
            &self.region.ring(RingKind::In),
            head,
            payload,
            sequence,
            source_id,
            RingKind::In,
        );
        self.region.control(ctl::IN_HEAD).store(new_head, Ordering::Release);

        Ok(sequence)
    }
}

/// Single-writer append path for the OUT and DEBUG rings.
///
/// Owned by the audio consumer; deliberately `!Sync` (the cached tail is a
/// plain cell) so the single-writer property holds by construction.
pub struct ReplyWriter {
    region: Arc<SharedRegion>,
    kind: RingKind,
    cached_tail: CachePadded<Cell<u32>>,
}

impl ReplyWriter {
    /// Creates the writer for one consumer-owned ring.
    ///
    /// # Panics
    ///
    /// Panics if asked for the IN ring, which is producer-written.
    pub fn new(region: Arc<SharedRegion>, kind: RingKind) -> Self {
        assert!(kind != RingKind::In, "IN is written through InWriter");
        Self { region, kind, cached_tail: CachePadded::new(Cell::new(0)) }
    }

    /// Largest aligned frame this ring accepts.
    #[inline]
    pub fn frame_limit(&self) -> usize {
        self.region.layout().ring(self.kind).len - HEADER_LEN
    }

    /// Appends one frame. Non-blocking; there is no lock to contend on.
    pub fn write(&self, payload: &[u8]) -> Result<u32, WriteError> {
        let ring_len = self.region.layout().ring(self.kind).len;
        let aligned = frame::aligned_len(payload.len());
        if aligned > ring_len - HEADER_LEN {
            self.region.metrics().incr(Counter::OversizeDropped);
            return Err(WriteError::Oversize {
                aligned: aligned as u32,
                limit: (ring_len - HEADER_LEN) as u32,
            });
        }

        // Only this writer moves head, so a relaxed load is our own last
        // store.
        let head = self.region.control(self.kind.head_word()).load(Ordering::Relaxed);
        debug_assert_ring_pos!("reply head", head, ring_len);
        let need = frame::required_space(ring_len, head, aligned);

        // Fast path against the cached tail; refresh from the drain only
        // when the cache says we might not fit.
        let mut tail = self.cached_tail.get();
        let mut free = frame::free_bytes(ring_len, head, tail);
        if free < need {
            tail = self.region.control(self.kind.tail_word()).load(Ordering::Acquire);
            self.cached_tail.set(tail);
            free = frame::free_bytes(ring_len, head, tail);
            if free < need {
                return Err(WriteError::Full { need: need as u32, free: free as u32 });
            }
        }

        let sequence = self.region.control(self.kind.seq_word()).fetch_add(1, Ordering::AcqRel);
        let new_head = frame::write_frame(
            &self.region.ring(self.kind),
            head,
            payload,
            sequence,
            0,
            self.kind,
        );
        self.region.control(self.kind.head_word()).store(new_head, Ordering::Release);

        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::RingDrain;
    use crate::LayoutConfig;

    fn small_region() -> Arc<SharedRegion> {
        Arc::new(SharedRegion::new(LayoutConfig::new(1024, 256, 256, 8)))
    }

    #[test]
    fn write_advances_head_by_aligned_len() {
        let region = small_region();
        let writer = InWriter::new(region.clone());

        writer.try_write(b"/status\0", 0).unwrap();
        assert_eq!(region.control(ctl::IN_HEAD).load(Ordering::Acquire), 24);

        writer.try_write(b"/ping\0", 0).unwrap();
        assert_eq!(region.control(ctl::IN_HEAD).load(Ordering::Acquire), 24 + 24);
    }

    #[test]
    fn sequences_are_gap_free() {
        let region = small_region();
        let writer = InWriter::new(region.clone());

        for expected in 0..10 {
            let seq = writer.try_write(b"x", 0).unwrap();
            assert_eq!(seq, expected);
        }
    }

    #[test]
    fn oversize_is_rejected_up_front() {
        let region = small_region();
        let writer = InWriter::new(region.clone());

        let too_big = vec![0u8; 1024];
        let err = writer.try_write(&too_big, 0).unwrap_err();
        assert!(matches!(err, WriteError::Oversize { .. }));
        assert_eq!(region.metrics().get(Counter::OversizeDropped), 1);
        // The lock must not be left held.
        assert_eq!(region.control(ctl::IN_WRITE_LOCK).load(Ordering::Acquire), 0);
    }

    #[test]
    fn boundary_payload_fills_an_empty_ring() {
        // aligned == ring - 16 must be accepted; one more byte must not.
        let region = small_region();
        let writer = InWriter::new(region.clone());

        let max_payload = 1024 - HEADER_LEN - HEADER_LEN;
        assert!(writer.try_write(&vec![1u8; max_payload], 0).is_ok());

        let region2 = small_region();
        let writer2 = InWriter::new(region2);
        let err = writer2.try_write(&vec![1u8; max_payload + 4], 0).unwrap_err();
        assert!(matches!(err, WriteError::Oversize { .. }));
    }

    #[test]
    fn exact_fit_accepts_and_one_byte_short_rejects() {
        let region = small_region();
        let writer = InWriter::new(region.clone());

        // Fill until a 64-byte payload frame (aligned 80) no longer fits,
        // then free exactly enough by advancing the tail.
        while writer.try_write(&[0u8; 64], 0).is_ok() {}

        let head = region.control(ctl::IN_HEAD).load(Ordering::Acquire);
        let tail = region.control(ctl::IN_TAIL).load(Ordering::Acquire);
        let aligned = frame::aligned_len(64);
        let need = frame::required_space(1024, head, aligned);
        let free = frame::free_bytes(1024, head, tail);
        assert!(free < need);

        // Advance tail so that free == need - 1: still rejected.
        let short_tail = (tail as usize + (need - 1 - free)) % 1024;
        region.control(ctl::IN_TAIL).store(short_tail as u32, Ordering::Release);
        assert!(matches!(
            writer.try_write(&[0u8; 64], 0),
            Err(WriteError::Full { .. })
        ));

        // One more byte of space: accepted.
        region.control(ctl::IN_TAIL).store((short_tail as u32 + 1) % 1024, Ordering::Release);
        assert!(writer.try_write(&[0u8; 64], 0).is_ok());
    }

    #[test]
    fn full_ring_recovers_after_drain() {
        let region = small_region();
        let writer = InWriter::new(region.clone());
        let drain = RingDrain::new(region.clone(), RingKind::In, 64);

        while writer.try_write(&[7u8; 100], 0).is_ok() {}
        assert!(matches!(writer.try_write(&[7u8; 100], 0), Err(WriteError::Full { .. })));

        let drained = drain.drain(|_, _| {});
        assert!(drained > 0);
        assert!(writer.try_write(&[7u8; 100], 0).is_ok());
    }

    #[test]
    fn log_tail_limits_free_space_when_observer_active() {
        let region = small_region();
        let writer = InWriter::new(region.clone());
        region.status_set(status::LOG_DRAIN);

        // Fill the ring; the log tail is stuck at zero so draining IN_TAIL
        // alone must not free any space.
        while writer.try_write(&[0u8; 64], 0).is_ok() {}
        let head = region.control(ctl::IN_HEAD).load(Ordering::Acquire);
        region.control(ctl::IN_TAIL).store(head, Ordering::Release);

        assert!(matches!(writer.try_write(&[0u8; 64], 0), Err(WriteError::Full { .. })));

        // Once the observer catches up, space frees.
        region.control(ctl::IN_LOG_TAIL).store(head, Ordering::Release);
        assert!(writer.try_write(&[0u8; 64], 0).is_ok());
    }

    #[test]
    fn reply_writer_round_trips_through_out() {
        let region = small_region();
        let writer = ReplyWriter::new(region.clone(), RingKind::Out);
        let drain = RingDrain::new(region.clone(), RingKind::Out, 16);

        writer.write(b"/done\0").unwrap();
        writer.write(b"/late\0").unwrap();

        let mut seen = Vec::new();
        drain.drain(|payload, info| seen.push((payload.to_vec(), info.sequence)));
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, b"/done\0");
        assert_eq!(seen[0].1, 0);
        assert_eq!(seen[1].1, 1);
    }

    #[test]
    fn reply_writer_reports_full_until_drained() {
        let region = small_region();
        let writer = ReplyWriter::new(region.clone(), RingKind::Out);
        let drain = RingDrain::new(region.clone(), RingKind::Out, 64);

        while writer.write(&[1u8; 32]).is_ok() {}
        assert!(matches!(writer.write(&[1u8; 32]), Err(WriteError::Full { .. })));

        drain.drain(|_, _| {});
        assert!(writer.write(&[1u8; 32]).is_ok());
    }
}
