//! Debug assertion macros for transport invariants.
//!
//! Active only in debug builds; release builds pay nothing. Shared by the
//! writer and drain paths so the checks read the same everywhere.

/// Assert that a ring position is inside the ring.
macro_rules! debug_assert_ring_pos {
    ($name:literal, $pos:expr, $size:expr) => {
        debug_assert!(
            ($pos as usize) < $size,
            "{} position {} outside ring of {} bytes",
            $name,
            $pos,
            $size
        )
    };
}

/// Assert that a frame length is header-sized, 4-aligned and fits the ring.
macro_rules! debug_assert_frame_len {
    ($len:expr, $size:expr) => {
        debug_assert!(
            ($len as usize) >= $crate::frame::HEADER_LEN
                && ($len as usize) <= $size
                && $len % 4 == 0,
            "frame length {} invalid for ring of {} bytes",
            $len,
            $size
        )
    };
}

/// Assert the IN write lock word holds a legal value (0 free, 1 held).
macro_rules! debug_assert_lock_word {
    ($val:expr) => {
        debug_assert!(
            $val <= 1,
            "write lock word holds {}; only 0/1 are legal",
            $val
        )
    };
}

pub(crate) use debug_assert_frame_len;
pub(crate) use debug_assert_lock_word;
pub(crate) use debug_assert_ring_pos;
