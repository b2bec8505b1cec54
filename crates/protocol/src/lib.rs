//! Protocol library for elm-usb
//!
//! This crate holds everything about the PL2303 adapter that can be stated without
//! touching a USB library: the device filter and request codes, the control request
//! model, the fixed bring-up script, the CDC line-coding structure, and the framing
//! rules for the carriage-return delimited ELM327 byte stream.
//!
//! # Example
//!
//! ```
//! use protocol::{FrameReassembler, encode_frame};
//!
//! let mut reassembler = FrameReassembler::new();
//! let wire = encode_frame("ATZ").unwrap();
//! assert_eq!(wire, b"ATZ\r");
//!
//! let frames = reassembler.feed(&wire);
//! assert_eq!(frames, vec!["ATZ".to_string()]);
//! ```
//!
//! # Bring-up
//!
//! The bring-up script is a fixed table of control transfers. Executing it is the job
//! of the `common` crate; this crate only describes it.
//!
//! ```
//! use protocol::{BRINGUP_SCRIPT, BringupStep};
//!
//! assert_eq!(BRINGUP_SCRIPT.len(), 33);
//! assert!(matches!(
//!     BRINGUP_SCRIPT[0],
//!     BringupStep::VendorRead { value: 0x8484, index: 0, length: 1 }
//! ));
//! ```

pub mod bringup;
pub mod constants;
pub mod error;
pub mod framing;
pub mod line_coding;
pub mod types;

pub use bringup::{BRINGUP_SCRIPT, BringupStep};
pub use constants::{
    DEFAULT_READ_CHUNK_SIZE, FRAME_DELIMITER, PL2303_PRODUCT_ID, PL2303_VENDOR_ID,
    SET_CONTROL_REQUEST, SET_LINE_REQUEST, VENDOR_READ_REQUEST, VENDOR_WRITE_REQUEST,
};
pub use error::{ProtocolError, Result};
pub use framing::{FrameReassembler, decode_frame, encode_frame};
pub use line_coding::{LineCoding, Parity, StopBits};
pub use types::{
    ControlRequest, Direction, EndpointDescriptor, Recipient, RequestType, TransferKind, UsbError,
};
