/// Sizing for the shared region's sub-segments.
///
/// All ring sizes must be multiples of 4 (frames are 4-byte aligned) and large
/// enough to hold at least one maximal header. Sizes are fixed at region
/// construction; the resulting offsets are published via
/// [`RegionLayout`](crate::RegionLayout) and cached by every attach.
#[derive(Debug, Clone, Copy)]
pub struct LayoutConfig {
    /// IN ring size in bytes (producers -> audio consumer).
    pub in_ring: usize,
    /// OUT ring size in bytes (audio consumer -> reply drain).
    pub out_ring: usize,
    /// DEBUG ring size in bytes (audio consumer -> debug drain).
    pub debug_ring: usize,
    /// Maximum number of entries in the node-tree snapshot.
    pub node_capacity: usize,
    /// Reserved audio-capture scratch size in bytes (not used by the core).
    pub audio_capture: usize,
}

impl LayoutConfig {
    /// Creates a layout configuration with custom ring sizes.
    ///
    /// # Panics
    ///
    /// Panics if any ring size is not a multiple of 4, smaller than 64 bytes,
    /// or if `node_capacity` is zero.
    pub const fn new(
        in_ring: usize,
        out_ring: usize,
        debug_ring: usize,
        node_capacity: usize,
    ) -> Self {
        assert!(in_ring >= 64 && in_ring % 4 == 0, "in_ring must be a multiple of 4, >= 64");
        assert!(out_ring >= 64 && out_ring % 4 == 0, "out_ring must be a multiple of 4, >= 64");
        assert!(
            debug_ring >= 64 && debug_ring % 4 == 0,
            "debug_ring must be a multiple of 4, >= 64"
        );
        assert!(node_capacity > 0, "node_capacity must be non-zero");

        Self {
            in_ring,
            out_ring,
            debug_ring,
            node_capacity,
            audio_capture: 16 * 1024,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            in_ring: 64 * 1024,
            out_ring: 16 * 1024,
            debug_ring: 16 * 1024,
            node_capacity: 128,
            audio_capture: 16 * 1024,
        }
    }
}

/// Small layout for latency-sensitive setups and wrap-heavy tests (16K IN ring).
pub const SMALL_LAYOUT: LayoutConfig = LayoutConfig::new(16 * 1024, 8 * 1024, 8 * 1024, 64);

/// Large layout for burst-heavy producers (256K IN ring).
pub const LARGE_LAYOUT: LayoutConfig = LayoutConfig::new(256 * 1024, 32 * 1024, 32 * 1024, 512);
