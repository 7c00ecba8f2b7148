//! The node-tree snapshot region.
//!
//! A forest of synthesis nodes published by the audio consumer as a flat
//! array of fixed-size entries holding integer indices (arena style, no
//! pointers). Readers copy entries out with plain loads and accept torn
//! reads; the version word is the coarse change detector. Only the consumer
//! ever writes here.
//!
//! Segment layout:
//!
//! ```text
//! bytes 0..4   count    u32, live entries
//! bytes 4..8   version  u32, bumped on every publish
//! bytes 8..    entries  count * 56 bytes
//! ```

use crate::region::SharedRegion;
use std::sync::atomic::Ordering;

/// Bytes reserved for a node's synth-def name.
pub const DEF_NAME_LEN: usize = 32;

/// Size of one serialized node entry.
pub const NODE_ENTRY_LEN: usize = 24 + DEF_NAME_LEN;

/// Count + version words.
pub const NODE_TREE_HEADER_LEN: usize = 8;

/// One node in the published forest. Links are indices into the same entry
/// array; -1 marks "none".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
    /// Node id as allocated by [`NodeIdAllocator`](crate::NodeIdAllocator).
    pub id: i32,
    /// Entry index of the parent group, or -1.
    pub parent: i32,
    /// True for group nodes.
    pub is_group: bool,
    /// Entry index of the previous sibling, or -1.
    pub prev: i32,
    /// Entry index of the next sibling, or -1.
    pub next: i32,
    /// Entry index of a group's first child, or -1.
    pub head: i32,
    /// Synth-def name, truncated to [`DEF_NAME_LEN`] bytes on publish.
    pub def_name: String,
}

impl NodeEntry {
    fn encode(&self) -> [u8; NODE_ENTRY_LEN] {
        let mut raw = [0u8; NODE_ENTRY_LEN];
        raw[0..4].copy_from_slice(&self.id.to_le_bytes());
        raw[4..8].copy_from_slice(&self.parent.to_le_bytes());
        raw[8..12].copy_from_slice(&i32::from(self.is_group).to_le_bytes());
        raw[12..16].copy_from_slice(&self.prev.to_le_bytes());
        raw[16..20].copy_from_slice(&self.next.to_le_bytes());
        raw[20..24].copy_from_slice(&self.head.to_le_bytes());
        let name = self.def_name.as_bytes();
        let n = name.len().min(DEF_NAME_LEN);
        raw[24..24 + n].copy_from_slice(&name[..n]);
        raw
    }

    fn decode(raw: &[u8]) -> Self {
        let word = |i: usize| {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&raw[i..i + 4]);
            i32::from_le_bytes(bytes)
        };
        let name_end = raw[24..24 + DEF_NAME_LEN]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(DEF_NAME_LEN);
        Self {
            id: word(0),
            parent: word(4),
            is_group: word(8) != 0,
            prev: word(12),
            next: word(16),
            head: word(20),
            def_name: String::from_utf8_lossy(&raw[24..24 + name_end]).into_owned(),
        }
    }
}

/// A decoded copy of the published tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTreeSnapshot {
    /// Version at the time of the copy.
    pub version: u32,
    /// The entries, in publish order.
    pub entries: Vec<NodeEntry>,
}

/// View over the node-tree segment of a region.
#[derive(Clone, Copy)]
pub struct NodeTreeView<'a> {
    region: &'a SharedRegion,
}

impl<'a> NodeTreeView<'a> {
    pub(crate) fn new(region: &'a SharedRegion) -> Self {
        Self { region }
    }

    #[inline]
    fn base(&self) -> usize {
        self.region.layout().node_tree.offset
    }

    /// Maximum number of entries the segment holds.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.region.layout().node_capacity
    }

    /// Current publish version.
    #[inline]
    pub fn version(&self) -> u32 {
        self.region.atomic(self.base() + 4).load(Ordering::Acquire)
    }

    /// Current entry count.
    #[inline]
    pub fn count(&self) -> u32 {
        self.region.atomic(self.base()).load(Ordering::Acquire)
    }

    /// Publishes a new forest, replacing the previous one and bumping the
    /// version. Consumer side only.
    ///
    /// # Panics
    ///
    /// Panics if `entries` exceeds the segment capacity.
    pub fn publish(&self, entries: &[NodeEntry]) {
        assert!(
            entries.len() <= self.capacity(),
            "node tree overflow: {} entries, capacity {}",
            entries.len(),
            self.capacity()
        );

        let mut off = self.base() + NODE_TREE_HEADER_LEN;
        for entry in entries {
            self.region.write_bytes(off, &entry.encode());
            off += NODE_ENTRY_LEN;
        }

        self.region.atomic(self.base()).store(entries.len() as u32, Ordering::Release);
        self.region.atomic(self.base() + 4).fetch_add(1, Ordering::AcqRel);
    }

    /// Copies the published forest out. The entry bytes are read with plain
    /// loads and may tear against a concurrent publish; compare `version`
    /// across reads when that matters.
    pub fn snapshot(&self) -> NodeTreeSnapshot {
        let version = self.version();
        let count = (self.count() as usize).min(self.capacity());

        let mut raw = vec![0u8; count * NODE_ENTRY_LEN];
        self.region.read_bytes(self.base() + NODE_TREE_HEADER_LEN, &mut raw);

        let entries = raw.chunks_exact(NODE_ENTRY_LEN).map(NodeEntry::decode).collect();
        NodeTreeSnapshot { version, entries }
    }
}
