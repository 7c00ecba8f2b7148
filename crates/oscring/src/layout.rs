//! Shared-region layout: segment offsets and control-word map.
//!
//! The region is one contiguous byte block carved into named segments. The
//! consumer side computes the layout once from a [`LayoutConfig`] and every
//! attach reads the resulting descriptor table and caches it. METRICS and
//! NODE_TREE are deliberately adjacent so observers can copy both out as a
//! single contiguous slice.
//!
//! ```text
//! +-----------+-----------+------------+----------+----------+------------+---------------+
//! | CONTROL   | METRICS   | NODE_TREE  | IN ring  | OUT ring | DEBUG ring | AUDIO_CAPTURE |
//! | 64 B      | 256 B     | 8+n*56 B   | cfg      | cfg      | cfg        | cfg (unused)  |
//! +-----------+-----------+------------+----------+----------+------------+---------------+
//! ```

use crate::config::LayoutConfig;
use crate::metrics::COUNTER_SLOTS;
use crate::node_tree::{NODE_TREE_HEADER_LEN, NODE_ENTRY_LEN};

/// Byte offsets of the atomic control words, relative to the CONTROL segment.
///
/// Every word is a 4-byte-aligned u32 accessed only through atomic operations.
pub mod ctl {
    /// IN ring head (written by producers under the write lock).
    pub const IN_HEAD: usize = 0;
    /// IN ring tail (written by the audio consumer).
    pub const IN_TAIL: usize = 4;
    /// Lagging IN tail advanced by the send-log observer.
    pub const IN_LOG_TAIL: usize = 8;
    /// OUT ring head (written by the audio consumer).
    pub const OUT_HEAD: usize = 12;
    /// OUT ring tail (written by the reply drain).
    pub const OUT_TAIL: usize = 16;
    /// DEBUG ring head (written by the audio consumer).
    pub const DEBUG_HEAD: usize = 20;
    /// DEBUG ring tail (written by the debug drain).
    pub const DEBUG_TAIL: usize = 24;
    /// Monotonic IN frame sequence counter.
    pub const IN_SEQ: usize = 28;
    /// Monotonic OUT frame sequence counter.
    pub const OUT_SEQ: usize = 32;
    /// Monotonic DEBUG frame sequence counter.
    pub const DEBUG_SEQ: usize = 36;
    /// Status bit flags, see [`super::status`].
    pub const STATUS_FLAGS: usize = 40;
    /// IN writer mutual exclusion word (0 free, 1 held).
    pub const IN_WRITE_LOCK: usize = 44;
    /// Next unclaimed node-ID range base.
    pub const NODE_ID_NEXT: usize = 48;

    /// Total CONTROL segment size in bytes.
    pub const SIZE: usize = 64;
}

/// Bits in the `STATUS_FLAGS` control word.
pub mod status {
    /// A consumer endpoint is attached and serving the region.
    pub const ATTACHED: u32 = 1;
    /// The send-log observer is active; the IN writer must also respect
    /// `IN_LOG_TAIL` when computing free space.
    pub const LOG_DRAIN: u32 = 1 << 1;
}

/// Which of the three byte rings an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingKind {
    /// Producers -> audio consumer.
    In,
    /// Audio consumer -> reply drain.
    Out,
    /// Audio consumer -> debug drain. Uses the single-byte wrap marker.
    Debug,
}

impl RingKind {
    /// Control-word offset of this ring's head.
    #[inline]
    pub fn head_word(self) -> usize {
        match self {
            Self::In => ctl::IN_HEAD,
            Self::Out => ctl::OUT_HEAD,
            Self::Debug => ctl::DEBUG_HEAD,
        }
    }

    /// Control-word offset of this ring's tail.
    #[inline]
    pub fn tail_word(self) -> usize {
        match self {
            Self::In => ctl::IN_TAIL,
            Self::Out => ctl::OUT_TAIL,
            Self::Debug => ctl::DEBUG_TAIL,
        }
    }

    /// Control-word offset of this ring's sequence counter.
    #[inline]
    pub fn seq_word(self) -> usize {
        match self {
            Self::In => ctl::IN_SEQ,
            Self::Out => ctl::OUT_SEQ,
            Self::Debug => ctl::DEBUG_SEQ,
        }
    }
}

/// One named sub-region of the shared block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Byte offset from the start of the region.
    pub offset: usize,
    /// Length in bytes.
    pub len: usize,
}

impl Segment {
    #[inline]
    const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// One past the last byte of the segment.
    #[inline]
    pub const fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// The published descriptor table: where every segment lives.
#[derive(Debug, Clone, Copy)]
pub struct RegionLayout {
    /// Atomic control words.
    pub control: Segment,
    /// u32 counter slots.
    pub metrics: Segment,
    /// Node-tree snapshot (count, version, entries).
    pub node_tree: Segment,
    /// IN byte ring.
    pub in_ring: Segment,
    /// OUT byte ring.
    pub out_ring: Segment,
    /// DEBUG byte ring.
    pub debug_ring: Segment,
    /// Reserved audio capture scratch.
    pub audio_capture: Segment,
    /// Node-tree entry capacity.
    pub node_capacity: usize,
    /// Total region size in bytes.
    pub total: usize,
}

impl RegionLayout {
    /// Computes the layout for the given configuration.
    pub fn compute(cfg: &LayoutConfig) -> Self {
        let control = Segment::new(0, ctl::SIZE);
        let metrics = Segment::new(control.end(), COUNTER_SLOTS * 4);
        let tree_len = align4(NODE_TREE_HEADER_LEN + cfg.node_capacity * NODE_ENTRY_LEN);
        let node_tree = Segment::new(metrics.end(), tree_len);
        let in_ring = Segment::new(node_tree.end(), cfg.in_ring);
        let out_ring = Segment::new(in_ring.end(), cfg.out_ring);
        let debug_ring = Segment::new(out_ring.end(), cfg.debug_ring);
        let audio_capture = Segment::new(debug_ring.end(), align4(cfg.audio_capture));

        Self {
            control,
            metrics,
            node_tree,
            in_ring,
            out_ring,
            debug_ring,
            audio_capture,
            node_capacity: cfg.node_capacity,
            total: audio_capture.end(),
        }
    }

    /// Segment of the given ring.
    #[inline]
    pub fn ring(&self, kind: RingKind) -> Segment {
        match kind {
            RingKind::In => self.in_ring,
            RingKind::Out => self.out_ring,
            RingKind::Debug => self.debug_ring,
        }
    }
}

#[inline]
const fn align4(n: usize) -> usize {
    (n + 3) & !3
}
