//! Range-based node-ID allocation.
//!
//! Producers hand out synthesis node IDs without coordinating per call: each
//! holds a claimed `[lo, hi)` range and a cursor, and only touches the shared
//! base counter when the range runs dry. The base counter lives in the
//! control block, so every context attached to the same region draws from
//! one namespace.

use crate::layout::ctl;
use crate::region::SharedRegion;
use std::cell::Cell;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Lowest ID ever returned; IDs below this are reserved for well-known nodes.
pub const NODE_ID_FLOOR: u32 = 1000;

/// Range width claimed by producers with fast-path access to the shared
/// base counter.
pub const RANGE_LOCAL: u32 = 1000;

/// Range width claimed by forwarded producers, where a claim is a message
/// round-trip worth amortising.
pub const RANGE_REMOTE: u32 = 10_000;

/// Source of fresh ID ranges.
///
/// The shared-memory implementation is a fetch-add on the control block;
/// forwarded producers claim through their message pump instead.
pub trait RangeSource: Send + Sync {
    /// Claims a half-open range `[base, base + width)` and returns `base`.
    ///
    /// Successive claims from any mix of callers must return disjoint,
    /// monotonically increasing ranges.
    fn claim(&self, width: u32) -> u32;
}

/// Fetch-add range claims on the region's `NODE_ID_NEXT` word.
pub struct SharedRangeSource {
    region: Arc<SharedRegion>,
}

impl SharedRangeSource {
    /// Creates a claim source over the given region.
    pub fn new(region: Arc<SharedRegion>) -> Self {
        Self { region }
    }
}

impl RangeSource for SharedRangeSource {
    fn claim(&self, width: u32) -> u32 {
        self.region.control(ctl::NODE_ID_NEXT).fetch_add(width, Ordering::SeqCst)
    }
}

/// Per-producer ID allocator: a claimed range plus a cursor.
///
/// Not `Sync` on purpose; every producer owns its allocator outright. IDs
/// are strictly increasing within one allocator, including across range
/// claims, because the shared base only ever moves forward.
pub struct NodeIdAllocator {
    source: Arc<dyn RangeSource>,
    width: u32,
    next: Cell<u32>,
    hi: Cell<u32>,
}

impl NodeIdAllocator {
    /// Creates an allocator claiming ranges of `width` IDs at a time. The
    /// first range is claimed lazily on the first call.
    pub fn new(source: Arc<dyn RangeSource>, width: u32) -> Self {
        assert!(width > 0, "range width must be non-zero");
        Self { source, width, next: Cell::new(0), hi: Cell::new(0) }
    }

    /// Returns the next node ID.
    pub fn next_id(&self) -> u32 {
        if self.next.get() == self.hi.get() {
            let base = self.source.claim(self.width);
            debug_assert!(base >= NODE_ID_FLOOR, "claimed range below the ID floor");
            debug_assert!(base >= self.hi.get(), "claimed range moved backwards");
            self.next.set(base);
            self.hi.set(base + self.width);
        }
        let id = self.next.get();
        self.next.set(id + 1);
        id
    }

    /// IDs remaining in the currently held range.
    pub fn remaining(&self) -> u32 {
        self.hi.get() - self.next.get()
    }
}
