//! Property-based checks over the positional frame routines.
//!
//! The frame format has to survive arbitrary payload sizes at arbitrary head
//! positions, including wrap markers and split frames, so these properties
//! drive the primitives directly over a local buffer rather than through a
//! region.

use oscring::{
    aligned_len, free_bytes, read_frames, required_space, write_frame, RingBytes, RingKind,
    HEADER_LEN,
};
use proptest::prelude::*;

const RING: usize = 1024;

proptest! {
    /// Any payload written at any legal head position reads back identically.
    #[test]
    fn frame_roundtrip_at_any_head(
        head in (0usize..RING / 4).prop_map(|w| (w * 4) as u32),
        payload in proptest::collection::vec(any::<u8>(), 0..512),
        seq in any::<u32>(),
        source in any::<u32>(),
    ) {
        let mut buf = vec![0u8; RING];
        let ring = RingBytes::from_slice(&mut buf);

        let new_head = write_frame(&ring, head, &payload, seq, source, RingKind::In);
        prop_assert_eq!(new_head as usize % 4, 0);

        let mut scratch = Vec::new();
        let mut got = None;
        let res = read_frames(
            &ring,
            new_head,
            head,
            RingKind::In,
            8,
            &mut scratch,
            |p, info| got = Some((p.to_vec(), info)),
            |off| panic!("corruption reported at {off}"),
        );

        let (bytes, info) = got.expect("frame not observed");
        prop_assert_eq!(bytes, payload);
        prop_assert_eq!(info.sequence, seq);
        prop_assert_eq!(info.source, source);
        prop_assert_eq!(res.tail, new_head);
        prop_assert_eq!(res.frames, 1);
    }

    /// Head advances by exactly the aligned frame length, modulo the ring,
    /// except across a skipped run-out.
    #[test]
    fn head_advance_matches_aligned_len(
        head in (0usize..RING / 4).prop_map(|w| (w * 4) as u32),
        payload_len in 0usize..512,
    ) {
        let mut buf = vec![0u8; RING];
        let ring = RingBytes::from_slice(&mut buf);
        let payload = vec![0u8; payload_len];

        let aligned = aligned_len(payload_len);
        let rem = RING - head as usize;
        let new_head = write_frame(&ring, head, &payload, 0, 0, RingKind::In);

        if aligned <= rem || rem >= HEADER_LEN {
            prop_assert_eq!(new_head as usize, (head as usize + aligned) % RING);
        } else {
            prop_assert_eq!(new_head as usize, aligned);
        }
        prop_assert_eq!(
            required_space(RING, head, aligned),
            if aligned <= rem || rem >= HEADER_LEN { aligned } else { rem + aligned }
        );
    }

    /// Back-to-back frames drain in order with consecutive positions.
    #[test]
    fn frame_train_preserves_order(
        sizes in proptest::collection::vec(0usize..96, 1..12),
    ) {
        let mut buf = vec![0u8; RING];
        let ring = RingBytes::from_slice(&mut buf);

        let mut head = 0u32;
        let mut expected = Vec::new();
        for (i, &len) in sizes.iter().enumerate() {
            // Respect the free-space rule a real writer enforces.
            let aligned = aligned_len(len);
            if free_bytes(RING, head, 0) < required_space(RING, head, aligned) {
                break;
            }
            let payload = vec![i as u8; len];
            head = write_frame(&ring, head, &payload, i as u32, 0, RingKind::In);
            expected.push(payload);
        }

        let mut scratch = Vec::new();
        let mut seen = Vec::new();
        let res = read_frames(
            &ring,
            head,
            0,
            RingKind::In,
            usize::MAX,
            &mut scratch,
            |p, _| seen.push(p.to_vec()),
            |off| panic!("corruption reported at {off}"),
        );

        prop_assert_eq!(seen, expected);
        prop_assert_eq!(res.tail, head);
    }
}
