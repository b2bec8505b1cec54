//! Integration tests for the frame reassembler
//!
//! Covers the reassembly properties the transport relies on:
//! - Scenario streams from an ELM327 session
//! - Chunk-boundary independence
//! - Empty-frame suppression
//! - Encode/decode round-trips for command text

use proptest::prelude::*;
use protocol::{FRAME_DELIMITER, FrameReassembler, encode_frame};

fn feed_all(chunks: &[&[u8]]) -> Vec<String> {
    let mut reassembler = FrameReassembler::new();
    chunks
        .iter()
        .flat_map(|chunk| reassembler.feed(chunk))
        .collect()
}

mod scenarios {
    use super::*;

    #[test]
    fn test_hex_scenario_single_frame() {
        let bytes = hex::decode("41420D").unwrap();
        assert_eq!(feed_all(&[bytes.as_slice()]), vec!["AB"]);
    }

    #[test]
    fn test_hex_scenario_only_delimiters() {
        let bytes = hex::decode("0D0D").unwrap();
        assert!(feed_all(&[bytes.as_slice()]).is_empty());
    }

    #[test]
    fn test_hex_scenario_split() {
        let first = hex::decode("41").unwrap();
        let second = hex::decode("420D").unwrap();
        assert_eq!(feed_all(&[first.as_slice(), second.as_slice()]), vec!["AB"]);
    }

    #[test]
    fn test_elm327_reset_banner() {
        // Echo, banner, blank line and prompt as a real adapter sends them
        let stream: &[&[u8]] = &[b"AT", b"Z\r\r\rELM32", b"7 v1.5\r", b"\r>"];
        assert_eq!(feed_all(stream), vec!["ATZ", "ELM327 v1.5"]);
    }

    #[test]
    fn test_pid_response_across_many_chunks() {
        let stream: &[&[u8]] = &[b"01", b"0C\r", b"41 0C", b" 1A F8", b"\r", b"\r>"];
        assert_eq!(feed_all(stream), vec!["010C", "41 0C 1A F8"]);
    }

    #[test]
    fn test_delimiter_in_payload_splits_frame() {
        // No escaping: a raw 0x0D always terminates the frame
        let stream: &[&[u8]] = &[&[0x31, 0x0D, 0x32, 0x0D]];
        assert_eq!(feed_all(stream), vec!["1", "2"]);
    }
}

mod properties {
    use super::*;

    fn non_delimiter_bytes() -> impl Strategy<Value = Vec<u8>> {
        let byte = any::<u8>().prop_filter("not a delimiter", |b| *b != FRAME_DELIMITER);
        prop::collection::vec(byte, 0..200)
    }

    fn split_at_points(data: &[u8], mut points: Vec<usize>) -> Vec<Vec<u8>> {
        points.retain(|p| *p <= data.len());
        points.sort_unstable();
        points.dedup();

        let mut chunks = Vec::new();
        let mut start = 0;
        for point in points {
            chunks.push(data[start..point].to_vec());
            start = point;
        }
        chunks.push(data[start..].to_vec());
        chunks
    }

    proptest! {
        #[test]
        fn no_delimiter_means_no_frames(
            data in non_delimiter_bytes(),
            splits in prop::collection::vec(0usize..200, 0..10),
        ) {
            let mut reassembler = FrameReassembler::new();
            for chunk in split_at_points(&data, splits) {
                prop_assert!(reassembler.feed(&chunk).is_empty());
            }
            prop_assert_eq!(reassembler.pending(), data.as_slice());
        }

        #[test]
        fn chunk_boundaries_do_not_matter(
            data in prop::collection::vec(prop_oneof![Just(FRAME_DELIMITER), any::<u8>()], 0..300),
            splits in prop::collection::vec(0usize..300, 0..20),
        ) {
            let mut whole = FrameReassembler::new();
            let expected = whole.feed(&data);

            let mut pieces = FrameReassembler::new();
            let actual: Vec<String> = split_at_points(&data, splits)
                .iter()
                .flat_map(|chunk| pieces.feed(chunk))
                .collect();

            prop_assert_eq!(actual, expected);
            prop_assert_eq!(pieces.pending(), whole.pending());
        }

        #[test]
        fn empty_frames_are_never_emitted(
            data in prop::collection::vec(prop_oneof![Just(FRAME_DELIMITER), any::<u8>()], 0..300),
        ) {
            let mut reassembler = FrameReassembler::new();
            for frame in reassembler.feed(&data) {
                prop_assert!(!frame.is_empty());
            }
        }

        #[test]
        fn printable_ascii_round_trips(text in "[ -~]{1,64}") {
            let mut reassembler = FrameReassembler::new();
            let frames = reassembler.feed(&encode_frame(&text).unwrap());
            prop_assert_eq!(frames, vec![text]);
        }

        #[test]
        fn single_byte_text_round_trips(
            codes in proptest::collection::vec(
                (1u8..=255).prop_filter("delimiter", |b| *b != FRAME_DELIMITER),
                1..64,
            )
        ) {
            let text: String = codes.iter().copied().map(char::from).collect();
            let wire = encode_frame(&text).unwrap();
            prop_assert_eq!(&wire[..wire.len() - 1], &codes[..]);

            let mut reassembler = FrameReassembler::new();
            prop_assert_eq!(reassembler.feed(&wire), vec![text]);
        }
    }
}
