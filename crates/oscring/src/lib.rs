//! oscring - Framed Shared-Memory Ring Transport for OSC
//!
//! A fixed-layout block of shared bytes carries three single-reader ring
//! buffers between producer threads and an audio-rate consumer: IN
//! (producers -> consumer, multi-writer under a CAS lock), OUT and DEBUG
//! (consumer -> drains, single-writer by construction). Frames are 16-byte
//! headers with magic-word corruption detection; wrap-around is handled by
//! split-writes and per-ring padding markers.
//!
//! # Key pieces
//!
//! - Pure positional frame routines shared by every reader and writer
//! - Acquire/release head/tail protocol; the head publish happens after the
//!   payload bytes, so a reader that sees the new head sees the whole frame
//! - Per-ring monotonic sequence numbers; drains charge losses from small
//!   sequence gaps and survive corruption by byte-level resync
//! - A range-based node-ID allocator over a shared fetch-add base
//! - A metrics counter block and node-tree snapshot published in-region
//!
//! # Example
//!
//! ```
//! use oscring::{EngineEndpoint, InWriter, LayoutConfig, SharedRegion};
//! use std::sync::Arc;
//!
//! let region = Arc::new(SharedRegion::new(LayoutConfig::default()));
//! let engine = EngineEndpoint::new(region.clone());
//!
//! // Any producer thread:
//! let writer = InWriter::new(region.clone());
//! writer.try_write(b"/status\0", 0).unwrap();
//!
//! // The audio callback:
//! let drained = engine.drain_in(|payload, info| {
//!     println!("frame {}: {} bytes", info.sequence, payload.len());
//! });
//! assert_eq!(drained, 1);
//! ```

mod backoff;
mod config;
mod engine;
mod error;
mod frame;
mod invariants;
mod layout;
mod metrics;
mod node_id;
mod node_tree;
mod reader;
mod region;
mod writer;

pub use backoff::Backoff;
pub use config::{LayoutConfig, LARGE_LAYOUT, SMALL_LAYOUT};
pub use engine::{EngineEndpoint, DEFAULT_IN_BLOCK_FRAMES};
pub use error::WriteError;
pub use frame::{
    aligned_len, free_bytes, read_frames, required_space, write_frame, FrameInfo, ReadOutcome,
    RingBytes, DEBUG_WRAP_BYTE, FRAME_MAGIC, HEADER_LEN, WRAP_MARKER,
};
pub use layout::{ctl, status, RegionLayout, RingKind, Segment};
pub use metrics::{Counter, LocalCounters, MetricsView, COUNTER_SLOTS};
pub use node_id::{
    NodeIdAllocator, RangeSource, SharedRangeSource, NODE_ID_FLOOR, RANGE_LOCAL, RANGE_REMOTE,
};
pub use node_tree::{
    NodeEntry, NodeTreeSnapshot, NodeTreeView, DEF_NAME_LEN, NODE_ENTRY_LEN, NODE_TREE_HEADER_LEN,
};
pub use reader::{RingDrain, GAP_TRUST_LIMIT};
pub use region::SharedRegion;
pub use writer::{InWriter, ReplyWriter};
