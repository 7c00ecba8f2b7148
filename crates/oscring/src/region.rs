//! The shared byte region and its atomic control block.
//!
//! One 64-byte-aligned allocation backs every segment described by
//! [`RegionLayout`]. Control words, metrics slots and the node-tree header
//! are only ever touched through [`AtomicU32`] references obtained from
//! [`SharedRegion::atomic`]; ring data bytes are only touched through
//! [`RingBytes`] windows under the head/tail protocol. The two sets of
//! offsets never overlap, which is what makes the mixed access sound.

use crate::frame::RingBytes;
use crate::layout::{ctl, RegionLayout, RingKind};
use crate::metrics::MetricsView;
use crate::node_id::NODE_ID_FLOOR;
use crate::node_tree::NodeTreeView;
use crate::LayoutConfig;
use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};

/// One cache line of region backing storage.
///
/// The wrapper exists purely to give the allocation 64-byte alignment, so
/// that every 4-aligned offset inside the region is valid for `AtomicU32`
/// access.
#[repr(C, align(64))]
struct Line(UnsafeCell<[u8; 64]>);

/// The shared region: one contiguous block of bytes plus its cached layout.
pub struct SharedRegion {
    lines: Box<[Line]>,
    layout: RegionLayout,
}

// SAFETY: all cross-thread mutation goes either through AtomicU32 references
// (control words, counters, node-tree header) or through ring byte ranges
// guarded by the acquire/release head/tail protocol. Plain byte reads of the
// node-tree entries may tear; readers accept that and use the version word
// as a change detector.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Allocates and initialises a region for the given configuration.
    ///
    /// All bytes start zeroed; the node-ID base is seeded with its floor
    /// value so the first claimed range starts at 1000.
    pub fn new(cfg: LayoutConfig) -> Self {
        let layout = RegionLayout::compute(&cfg);
        let line_count = layout.total.div_ceil(64);
        let mut lines = Vec::with_capacity(line_count);
        lines.resize_with(line_count, || Line(UnsafeCell::new([0u8; 64])));

        let region = Self { lines: lines.into_boxed_slice(), layout };
        region.atomic(ctl::NODE_ID_NEXT).store(NODE_ID_FLOOR, Ordering::Release);
        region
    }

    /// The published descriptor table.
    #[inline]
    pub fn layout(&self) -> &RegionLayout {
        &self.layout
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        self.lines[0].0.get().cast::<u8>()
    }

    /// Returns the atomic u32 at an absolute byte offset.
    ///
    /// # Panics
    ///
    /// Debug-asserts that the offset is 4-aligned and in bounds.
    #[inline]
    pub fn atomic(&self, offset: usize) -> &AtomicU32 {
        debug_assert!(offset % 4 == 0, "atomic slot {offset} not 4-aligned");
        debug_assert!(offset + 4 <= self.layout.total);
        // SAFETY: offset is 4-aligned within a 64-aligned live allocation,
        // and the returned reference borrows self, so it cannot outlive the
        // region. Atomic slots are never aliased by plain byte access.
        unsafe { &*self.base().add(offset).cast::<AtomicU32>() }
    }

    /// Returns the atomic control word for `word` (an offset from
    /// [`ctl`](crate::layout::ctl)).
    #[inline]
    pub fn control(&self, word: usize) -> &AtomicU32 {
        debug_assert!(word + 4 <= ctl::SIZE);
        self.atomic(self.layout.control.offset + word)
    }

    /// A byte window onto one of the three rings.
    #[inline]
    pub fn ring(&self, kind: RingKind) -> RingBytes<'_> {
        let seg = self.layout.ring(kind);
        // SAFETY: the segment is in bounds and ring bytes are only accessed
        // under the head/tail protocol enforced by the writer/drain types.
        unsafe { RingBytes::from_raw(self.base().add(seg.offset), seg.len) }
    }

    /// A view over the metrics counter slots.
    #[inline]
    pub fn metrics(&self) -> MetricsView<'_> {
        MetricsView::new(self)
    }

    /// A view over the node-tree snapshot segment.
    #[inline]
    pub fn node_tree(&self) -> NodeTreeView<'_> {
        NodeTreeView::new(self)
    }

    /// Copies raw bytes out of the region. Reads are plain (non-atomic) and
    /// may tear against concurrent writers; only use on segments where that
    /// is acceptable.
    pub(crate) fn read_bytes(&self, offset: usize, dst: &mut [u8]) {
        debug_assert!(offset + dst.len() <= self.layout.total);
        // SAFETY: bounds checked above.
        unsafe { ptr::copy_nonoverlapping(self.base().add(offset), dst.as_mut_ptr(), dst.len()) }
    }

    /// Copies raw bytes into the region. Single-writer segments only.
    pub(crate) fn write_bytes(&self, offset: usize, src: &[u8]) {
        debug_assert!(offset + src.len() <= self.layout.total);
        // SAFETY: bounds checked above.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), self.base().add(offset), src.len()) }
    }

    /// Sets bits in the status flags word.
    pub fn status_set(&self, bits: u32) {
        self.control(ctl::STATUS_FLAGS).fetch_or(bits, Ordering::AcqRel);
    }

    /// Clears bits in the status flags word.
    pub fn status_clear(&self, bits: u32) {
        self.control(ctl::STATUS_FLAGS).fetch_and(!bits, Ordering::AcqRel);
    }

    /// Tests bits in the status flags word.
    pub fn status_has(&self, bits: u32) -> bool {
        self.control(ctl::STATUS_FLAGS).load(Ordering::Acquire) & bits == bits
    }

    /// Copies the METRICS and NODE_TREE segments out as one contiguous
    /// slice. The two segments are adjacent by construction.
    pub fn snapshot_metrics_and_tree(&self) -> Vec<u8> {
        let start = self.layout.metrics.offset;
        let len = self.layout.metrics.len + self.layout.node_tree.len;
        let mut out = vec![0u8; len];
        self.read_bytes(start, &mut out);
        out
    }

    /// Resets every head, tail, sequence, lock and status word to zero and
    /// re-seeds the node-ID base.
    ///
    /// This is the teardown path: frames still in flight in any ring are
    /// discarded, not flushed.
    pub fn reset(&self) {
        for word in [
            ctl::IN_HEAD,
            ctl::IN_TAIL,
            ctl::IN_LOG_TAIL,
            ctl::OUT_HEAD,
            ctl::OUT_TAIL,
            ctl::DEBUG_HEAD,
            ctl::DEBUG_TAIL,
            ctl::IN_SEQ,
            ctl::OUT_SEQ,
            ctl::DEBUG_SEQ,
            ctl::STATUS_FLAGS,
            ctl::IN_WRITE_LOCK,
        ] {
            self.control(word).store(0, Ordering::Release);
        }
        self.control(ctl::NODE_ID_NEXT).store(NODE_ID_FLOOR, Ordering::Release);
    }
}
