//! Carriage-return framing for the bulk byte stream
//!
//! The adapter streams ELM327 output as raw bytes with no inherent framing. A frame
//! is every byte between two `0x0D` delimiters. Frames are rendered to text by taking
//! the hex form of the bytes and reading it back as pairs of character codes, which
//! maps each byte onto the character with the same code.
//!
//! # Wire Format
//!
//! ```text
//! [payload bytes][0x0D][payload bytes][0x0D]...
//! ```
//!
//! There is no escaping. A `0x0D` inside intended payload always ends the frame.

use crate::constants::FRAME_DELIMITER;
use crate::error::{ProtocolError, Result};
use bytes::{BufMut, BytesMut};

/// Stateful accumulator turning raw chunks into delimited frames
///
/// Only the bytes received since the last delimiter are retained between calls, so
/// splitting a stream across `feed` calls at any boundary yields the same frames as
/// feeding it at once.
///
/// # Example
/// ```
/// use protocol::FrameReassembler;
///
/// let mut reassembler = FrameReassembler::new();
/// assert!(reassembler.feed(&[0x41]).is_empty());
/// assert_eq!(reassembler.feed(&[0x42, 0x0D]), vec!["AB".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct FrameReassembler {
    accumulator: BytesMut,
}

impl FrameReassembler {
    /// Create an empty reassembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk, invoking `on_frame` once per completed non-empty frame
    ///
    /// Frames are delivered in the order their delimiters appear in the stream.
    pub fn feed_with<F>(&mut self, chunk: &[u8], mut on_frame: F)
    where
        F: FnMut(String),
    {
        for &byte in chunk {
            if byte == FRAME_DELIMITER {
                if !self.accumulator.is_empty() {
                    let frame = self.accumulator.split();
                    on_frame(decode_frame(&frame));
                }
                self.accumulator.clear();
            } else {
                self.accumulator.put_u8(byte);
            }
        }
    }

    /// Consume a chunk and return the frames it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut frames = Vec::new();
        self.feed_with(chunk, |frame| frames.push(frame));
        frames
    }

    /// Bytes received since the last delimiter
    pub fn pending(&self) -> &[u8] {
        &self.accumulator
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.accumulator.clear();
    }
}

/// Render frame bytes as text
///
/// Every byte becomes the character with the same code point.
pub fn decode_frame(frame: &[u8]) -> String {
    frame.iter().copied().map(char::from).collect()
}

/// Build the outbound wire bytes for a command: the text followed by the delimiter
///
/// Each character is sent as the single byte of its code point, the inverse of
/// [`decode_frame`]. Characters above U+00FF have no such byte and are rejected.
pub fn encode_frame(text: &str) -> Result<Vec<u8>> {
    let mut frame = Vec::with_capacity(text.len() + 1);
    for c in text.chars() {
        let byte = u8::try_from(c).map_err(|_| ProtocolError::UnencodableChar(c))?;
        frame.push(byte);
    }
    frame.push(FRAME_DELIMITER);
    Ok(frame)
}
