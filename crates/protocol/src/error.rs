//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Line coding payload has the wrong size
    #[error("Invalid line coding length: {actual} bytes (expected {expected})")]
    InvalidLineCodingLength { expected: usize, actual: usize },

    /// Unknown bCharFormat value
    #[error("Invalid stop bits code: {0}")]
    InvalidStopBits(u8),

    /// Unknown bParityType value
    #[error("Invalid parity code: {0}")]
    InvalidParity(u8),

    /// Outbound text holds a character with no single-byte code
    #[error("Character {0:?} cannot be sent as a single byte")]
    UnencodableChar(char),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::InvalidLineCodingLength {
            expected: 7,
            actual: 3,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Invalid line coding length"));
        assert!(msg.contains("3 bytes"));
        assert!(msg.contains("expected 7"));
    }

    #[test]
    fn test_unencodable_char_display() {
        let err = ProtocolError::UnencodableChar('\u{20ac}');
        assert_eq!(err.to_string(), "Character '€' cannot be sent as a single byte");
    }

    #[test]
    fn test_errors_compare_by_value() {
        fn assert_eq_impl<T: Eq>() {}
        assert_eq_impl::<ProtocolError>();

        assert_eq!(ProtocolError::InvalidParity(7), ProtocolError::InvalidParity(7));
        assert_ne!(
            ProtocolError::InvalidStopBits(3),
            ProtocolError::InvalidParity(3)
        );
    }
}
