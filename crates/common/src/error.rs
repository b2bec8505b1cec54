//! Common error types

use protocol::{Direction, ProtocolError, UsbError};
use thiserror::Error;

/// A single control or bulk transfer did not complete as required
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("USB transfer failed: {0}")]
    Usb(#[from] UsbError),

    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Short write: wrote {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },
}

impl TransferError {
    /// Whether the transfer failed because the session was closed
    pub fn is_closed(&self) -> bool {
        matches!(self, TransferError::Usb(UsbError::Closed))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// `step` is 1-based
    #[error("Bring-up failed at step {step} ({name}): {source}")]
    Bringup {
        step: usize,
        name: &'static str,
        #[source]
        source: TransferError,
    },

    #[error("No bulk {direction} endpoint on the active interface")]
    EndpointNotFound { direction: Direction },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Device acquisition failed: {0}")]
    Acquisition(String),

    #[error("Session not ready: {0}")]
    NotReady(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<UsbError> for Error {
    fn from(err: UsbError) -> Self {
        Error::Transfer(TransferError::Usb(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bringup_error_display() {
        let err = Error::Bringup {
            step: 5,
            name: "vendor_read",
            source: TransferError::Usb(UsbError::Pipe),
        };
        let msg = err.to_string();
        assert!(msg.contains("step 5"));
        assert!(msg.contains("vendor_read"));
        assert!(msg.contains("endpoint stalled"));
    }

    #[test]
    fn test_short_write_display() {
        let err = TransferError::ShortWrite {
            expected: 4,
            written: 2,
        };
        assert_eq!(err.to_string(), "Short write: wrote 2 of 4 bytes");
    }

    #[test]
    fn test_endpoint_not_found_display() {
        let err = Error::EndpointNotFound {
            direction: Direction::In,
        };
        assert_eq!(
            err.to_string(),
            "No bulk in endpoint on the active interface"
        );
    }

    #[test]
    fn test_closed_detection() {
        assert!(TransferError::Usb(UsbError::Closed).is_closed());
        assert!(!TransferError::Usb(UsbError::NoDevice).is_closed());
    }
}
