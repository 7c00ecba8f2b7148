//! Bundle-level OSC framing.
//!
//! The link never decodes addresses or arguments; that belongs to the codec
//! on either side of the transport. What it does need is the bundle shell:
//! the `#bundle\0` tag, the big-endian 32.32 timetag at bytes 8..16, and the
//! u32-size-prefixed elements that follow. That is exactly what lives here.

/// Leading bytes of every OSC bundle.
pub const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

/// Byte length of the bundle shell (tag + timetag).
pub const BUNDLE_HEADER_LEN: usize = 16;

/// True when the payload is an OSC bundle.
#[inline]
pub fn is_bundle(payload: &[u8]) -> bool {
    payload.len() >= BUNDLE_HEADER_LEN && &payload[..8] == BUNDLE_TAG
}

/// Raw 32.32 big-endian timetag of a bundle, or `None` for plain messages.
#[inline]
pub fn bundle_timetag(payload: &[u8]) -> Option<u64> {
    if !is_bundle(payload) {
        return None;
    }
    Some(u64::from_be_bytes(payload[8..16].try_into().ok()?))
}

/// Iterator over a bundle's size-prefixed elements.
///
/// Stops at the first truncated or impossible prefix; a well-formed bundle
/// is consumed completely.
pub struct BundleElements<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for BundleElements<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.len() < 4 {
            return None;
        }
        let len = u32::from_be_bytes(self.rest[..4].try_into().ok()?) as usize;
        if len == 0 || self.rest.len() < 4 + len {
            return None;
        }
        let element = &self.rest[4..4 + len];
        self.rest = &self.rest[4 + len..];
        Some(element)
    }
}

/// The elements of a bundle payload. Empty for plain messages.
pub fn bundle_elements(payload: &[u8]) -> BundleElements<'_> {
    let rest = if is_bundle(payload) { &payload[BUNDLE_HEADER_LEN..] } else { &[][..] };
    BundleElements { rest }
}

/// Builds a bundle from a timetag and element payloads.
pub fn encode_bundle(timetag: u64, elements: &[&[u8]]) -> Vec<u8> {
    let body: usize = elements.iter().map(|e| 4 + e.len()).sum();
    let mut out = Vec::with_capacity(BUNDLE_HEADER_LEN + body);
    out.extend_from_slice(BUNDLE_TAG);
    out.extend_from_slice(&timetag.to_be_bytes());
    for element in elements {
        out.extend_from_slice(&(element.len() as u32).to_be_bytes());
        out.extend_from_slice(element);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_message_is_not_a_bundle() {
        assert!(!is_bundle(b"/status\0"));
        assert_eq!(bundle_timetag(b"/status\0"), None);
        assert_eq!(bundle_elements(b"/status\0").count(), 0);
    }

    #[test]
    fn timetag_is_big_endian() {
        let bundle = encode_bundle(0x0000_000A_8000_0000, &[]);
        assert_eq!(&bundle[8..16], &[0, 0, 0, 0x0A, 0x80, 0, 0, 0]);
        assert_eq!(bundle_timetag(&bundle), Some(0x0000_000A_8000_0000));
    }

    #[test]
    fn elements_round_trip() {
        let a = b"/synth/new\0\0".as_slice();
        let b = b"/node/free\0\0".as_slice();
        let bundle = encode_bundle(1, &[a, b]);

        let elements: Vec<&[u8]> = bundle_elements(&bundle).collect();
        assert_eq!(elements, vec![a, b]);
    }

    #[test]
    fn truncated_element_stops_iteration() {
        let mut bundle = encode_bundle(1, &[b"/ok\0".as_slice()]);
        // Claim a second element longer than what follows.
        bundle.extend_from_slice(&64u32.to_be_bytes());
        bundle.extend_from_slice(b"short");

        let elements: Vec<&[u8]> = bundle_elements(&bundle).collect();
        assert_eq!(elements, vec![b"/ok\0".as_slice()]);
    }

    #[test]
    fn short_bundle_tag_is_plain() {
        assert!(!is_bundle(b"#bundle"));
        assert!(!is_bundle(b"#bundlX\0AAAAAAAA"));
    }
}
