//! MTU-aware frame segmentation.
//!
//! A capture frame is sliced into datagram-sized segments before fan-out.
//! Segment length is the largest multiple of the stream's block alignment
//! that fits the path MTU after IPv4 and UDP headers, so a sample frame is
//! never split across datagrams.

use std::num::NonZeroUsize;

/// Default path MTU (Ethernet with PPPoE, the reference deployment).
pub const DEFAULT_MTU: usize = 1492;

const IPV4_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;

/// UDP payload bytes available under the given MTU.
pub const fn payload_budget(mtu: usize) -> usize {
    mtu.saturating_sub(IPV4_HEADER_LEN + UDP_HEADER_LEN)
}

/// Largest block-aligned segment length under `mtu`.
///
/// `None` when no aligned segment fits: a zero alignment, or one larger
/// than the payload budget. Callers drop the frame in that case.
pub fn segment_size(mtu: usize, block_align: usize) -> Option<NonZeroUsize> {
    if block_align == 0 {
        return None;
    }
    let budget = payload_budget(mtu);
    NonZeroUsize::new(budget - budget % block_align)
}

/// Slice a frame into segments of at most `seg_size` bytes.
///
/// Segments borrow from the frame; the final segment may be shorter but
/// stays aligned as long as the frame length is a whole number of sample
/// frames. Concatenating the segments reproduces the frame exactly.
pub fn segment_frame(frame: &[u8], seg_size: NonZeroUsize) -> impl Iterator<Item = &[u8]> {
    frame.chunks(seg_size.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_is_1464() {
        assert_eq!(payload_budget(DEFAULT_MTU), 1464);
    }

    #[test]
    fn segment_size_truncates_to_alignment() {
        // 1464 is divisible by 8 but not by 16 (four f32 channels).
        assert_eq!(segment_size(DEFAULT_MTU, 8).unwrap().get(), 1464);
        assert_eq!(segment_size(DEFAULT_MTU, 16).unwrap().get(), 1456);
    }

    #[test]
    fn segment_size_rejects_impossible_alignment() {
        assert!(segment_size(DEFAULT_MTU, 0).is_none());
        assert!(segment_size(DEFAULT_MTU, 2000).is_none());
        assert!(segment_size(30, 4).is_none());
    }

    #[test]
    fn frame_3000_align_8() {
        let frame: Vec<u8> = (0..3000u32).map(|i| i as u8).collect();
        let seg_size = segment_size(DEFAULT_MTU, 8).unwrap();
        let segments: Vec<&[u8]> = segment_frame(&frame, seg_size).collect();

        let lengths: Vec<usize> = segments.iter().map(|seg| seg.len()).collect();
        assert_eq!(lengths, vec![1464, 1464, 72]);
    }

    #[test]
    fn single_segment_when_frame_fits() {
        let frame = vec![0u8; 480];
        let seg_size = segment_size(DEFAULT_MTU, 4).unwrap();
        let segments: Vec<&[u8]> = segment_frame(&frame, seg_size).collect();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), 480);
    }

    #[test]
    fn concatenation_reproduces_frame() {
        for (len, align) in [(3000usize, 8usize), (1464, 4), (1465 * 5, 5), (12, 12)] {
            let frame: Vec<u8> = (0..len).map(|i| (i * 31) as u8).collect();
            let seg_size = segment_size(DEFAULT_MTU, align).unwrap();

            let mut rebuilt = Vec::with_capacity(len);
            for seg in segment_frame(&frame, seg_size) {
                // every segment except possibly the last is full-sized
                assert!(seg.len() <= seg_size.get());
                rebuilt.extend_from_slice(seg);
            }
            assert_eq!(rebuilt, frame);
        }
    }

    #[test]
    fn every_segment_is_aligned() {
        let align = 12usize;
        let frame = vec![0u8; align * 250];
        let seg_size = segment_size(DEFAULT_MTU, align).unwrap();
        for seg in segment_frame(&frame, seg_size) {
            assert_eq!(seg.len() % align, 0);
        }
    }

    #[test]
    fn segment_count_matches_ceiling_division() {
        let frame = vec![0u8; 3000];
        let seg_size = segment_size(DEFAULT_MTU, 8).unwrap();
        let expected = frame.len().div_ceil(seg_size.get());
        assert_eq!(segment_frame(&frame, seg_size).count(), expected);
    }
}
