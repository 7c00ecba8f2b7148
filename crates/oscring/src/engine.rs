//! The consumer-side endpoint.
//!
//! One [`EngineEndpoint`] exists per region and belongs to the audio-rate
//! consumer: it drains IN once per audio block, publishes replies and debug
//! text on the rings it exclusively writes, and owns the node-tree snapshot.
//! The endpoint is `!Sync` (reply writers cache their tails in plain cells),
//! which pins the single-writer property of OUT and DEBUG to the type.

use crate::error::WriteError;
use crate::frame::FrameInfo;
use crate::layout::{status, RingKind};
use crate::metrics::{Counter, MetricsView};
use crate::node_tree::NodeTreeView;
use crate::reader::RingDrain;
use crate::region::SharedRegion;
use crate::writer::ReplyWriter;
use std::sync::Arc;

/// Frames drained from IN per audio block by default.
pub const DEFAULT_IN_BLOCK_FRAMES: usize = 64;

/// The audio consumer's handle on the region.
pub struct EngineEndpoint {
    region: Arc<SharedRegion>,
    out: ReplyWriter,
    debug: ReplyWriter,
    in_drain: RingDrain,
}

impl EngineEndpoint {
    /// Attaches the consumer to a region and marks it live.
    pub fn new(region: Arc<SharedRegion>) -> Self {
        region.status_set(status::ATTACHED);
        Self {
            out: ReplyWriter::new(region.clone(), RingKind::Out),
            debug: ReplyWriter::new(region.clone(), RingKind::Debug),
            in_drain: RingDrain::new(region.clone(), RingKind::In, DEFAULT_IN_BLOCK_FRAMES),
            region,
        }
    }

    /// The region this endpoint serves.
    #[inline]
    pub fn region(&self) -> &Arc<SharedRegion> {
        &self.region
    }

    /// Drains up to one block's worth of IN frames into `handler`.
    ///
    /// Called from the audio callback; never blocks.
    pub fn drain_in(&self, mut handler: impl FnMut(&[u8], FrameInfo)) -> usize {
        let n = self.in_drain.drain(&mut handler);
        if n > 0 {
            self.region.metrics().add(Counter::MessagesProcessed, n as u32);
        }
        n
    }

    /// Publishes an OSC reply on OUT.
    pub fn reply(&self, payload: &[u8]) -> Result<u32, WriteError> {
        let seq = self.out.write(payload)?;
        self.region.metrics().incr(Counter::RepliesSent);
        Ok(seq)
    }

    /// Publishes a line of debug text on DEBUG.
    pub fn debug_text(&self, text: &str) -> Result<u32, WriteError> {
        let seq = self.debug.write(text.as_bytes())?;
        self.region.metrics().incr(Counter::DebugWritten);
        Ok(seq)
    }

    /// The node-tree publish view.
    #[inline]
    pub fn node_tree(&self) -> NodeTreeView<'_> {
        self.region.node_tree()
    }

    /// The metrics view.
    #[inline]
    pub fn metrics(&self) -> MetricsView<'_> {
        self.region.metrics()
    }

    /// Detaches the consumer and resets all transport state. Frames still
    /// in flight are discarded.
    pub fn shutdown(&self) {
        self.region.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::InWriter;
    use crate::LayoutConfig;

    #[test]
    fn endpoint_marks_region_attached() {
        let region = Arc::new(SharedRegion::new(LayoutConfig::default()));
        assert!(!region.status_has(status::ATTACHED));
        let engine = EngineEndpoint::new(region.clone());
        assert!(region.status_has(status::ATTACHED));
        engine.shutdown();
        assert!(!region.status_has(status::ATTACHED));
    }

    #[test]
    fn drain_in_counts_processed_frames() {
        let region = Arc::new(SharedRegion::new(LayoutConfig::default()));
        let writer = InWriter::new(region.clone());
        let engine = EngineEndpoint::new(region.clone());

        for _ in 0..3 {
            writer.try_write(b"/status\0", 0).unwrap();
        }

        let mut payloads = Vec::new();
        engine.drain_in(|p, _| payloads.push(p.to_vec()));

        assert_eq!(payloads.len(), 3);
        assert!(payloads.iter().all(|p| p.starts_with(b"/status\0")));
        assert_eq!(region.metrics().get(Counter::MessagesProcessed), 3);
    }

    #[test]
    fn replies_and_debug_use_distinct_rings() {
        let region = Arc::new(SharedRegion::new(LayoutConfig::default()));
        let engine = EngineEndpoint::new(region.clone());

        engine.reply(b"/status.reply\0").unwrap();
        engine.debug_text("booting synth engine").unwrap();

        let out = RingDrain::new(region.clone(), RingKind::Out, 16);
        let dbg = RingDrain::new(region.clone(), RingKind::Debug, 16);

        let mut out_seen = 0;
        out.drain(|p, _| {
            assert_eq!(p, b"/status.reply\0");
            out_seen += 1;
        });
        let mut dbg_seen = 0;
        dbg.drain(|p, _| {
            assert_eq!(p, b"booting synth engine");
            dbg_seen += 1;
        });

        assert_eq!((out_seen, dbg_seen), (1, 1));
        assert_eq!(region.metrics().get(Counter::RepliesSent), 1);
        assert_eq!(region.metrics().get(Counter::DebugWritten), 1);
    }
}
