//! CDC line coding structure
//!
//! SET_LINE_CODING carries 7 bytes: dwDTERate (u32, little-endian), bCharFormat,
//! bParityType, bDataBits. The transfer layer sends these as an opaque blob; this
//! type exists to build and inspect them.

use crate::error::{ProtocolError, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Encoded size of a line coding
pub const LINE_CODING_LEN: usize = 7;

/// bCharFormat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

/// bParityType
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

/// Serial line parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCoding {
    pub baud_rate: u32,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub data_bits: u8,
}

impl LineCoding {
    /// Encode to the 7-byte wire layout
    pub fn to_bytes(&self) -> [u8; LINE_CODING_LEN] {
        let mut buf = [0u8; LINE_CODING_LEN];
        LittleEndian::write_u32(&mut buf[..4], self.baud_rate);
        buf[4] = match self.stop_bits {
            StopBits::One => 0,
            StopBits::OnePointFive => 1,
            StopBits::Two => 2,
        };
        buf[5] = match self.parity {
            Parity::None => 0,
            Parity::Odd => 1,
            Parity::Even => 2,
            Parity::Mark => 3,
            Parity::Space => 4,
        };
        buf[6] = self.data_bits;
        buf
    }

    /// Decode from the 7-byte wire layout
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != LINE_CODING_LEN {
            return Err(ProtocolError::InvalidLineCodingLength {
                expected: LINE_CODING_LEN,
                actual: bytes.len(),
            });
        }

        let stop_bits = match bytes[4] {
            0 => StopBits::One,
            1 => StopBits::OnePointFive,
            2 => StopBits::Two,
            other => return Err(ProtocolError::InvalidStopBits(other)),
        };
        let parity = match bytes[5] {
            0 => Parity::None,
            1 => Parity::Odd,
            2 => Parity::Even,
            3 => Parity::Mark,
            4 => Parity::Space,
            other => return Err(ProtocolError::InvalidParity(other)),
        };

        Ok(Self {
            baud_rate: LittleEndian::read_u32(&bytes[..4]),
            stop_bits,
            parity,
            data_bits: bytes[6],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_38400_8n1() {
        let coding = LineCoding {
            baud_rate: 38400,
            stop_bits: StopBits::One,
            parity: Parity::None,
            data_bits: 8,
        };
        assert_eq!(
            coding.to_bytes(),
            [0x00, 0x96, 0x00, 0x00, 0x00, 0x00, 0x08]
        );
    }

    #[test]
    fn test_decode_rejects_bad_length() {
        assert_eq!(
            LineCoding::from_bytes(&[0x00, 0x96]),
            Err(ProtocolError::InvalidLineCodingLength {
                expected: 7,
                actual: 2
            })
        );
    }

    #[test]
    fn test_decode_rejects_unknown_codes() {
        assert_eq!(
            LineCoding::from_bytes(&[0, 0x96, 0, 0, 9, 0, 8]),
            Err(ProtocolError::InvalidStopBits(9))
        );
        assert_eq!(
            LineCoding::from_bytes(&[0, 0x96, 0, 0, 0, 7, 8]),
            Err(ProtocolError::InvalidParity(7))
        );
    }

    #[test]
    fn test_decode_even_parity_two_stop() {
        let coding = LineCoding::from_bytes(&[0x80, 0x25, 0x00, 0x00, 2, 2, 7]).unwrap();
        assert_eq!(coding.baud_rate, 9600);
        assert_eq!(coding.stop_bits, StopBits::Two);
        assert_eq!(coding.parity, Parity::Even);
        assert_eq!(coding.data_bits, 7);
    }
}
