//! Fixed identifiers and wire constants for the PL2303 adapter

/// Prolific Technology vendor ID
pub const PL2303_VENDOR_ID: u16 = 0x067B;

/// PL2303 USB-to-serial bridge product ID
pub const PL2303_PRODUCT_ID: u16 = 0x2303;

/// Vendor-specific control IN request (bRequest)
pub const VENDOR_READ_REQUEST: u8 = 0x01;

/// Vendor-specific control OUT request (bRequest)
pub const VENDOR_WRITE_REQUEST: u8 = 0x01;

/// CDC SET_LINE_CODING
pub const SET_LINE_REQUEST: u8 = 0x20;

/// CDC SET_CONTROL_LINE_STATE
pub const SET_CONTROL_REQUEST: u8 = 0x22;

/// Frame delimiter on the bulk stream (carriage return)
///
/// There is no escaping: a payload byte equal to this value always ends a frame.
pub const FRAME_DELIMITER: u8 = 0x0D;

/// Maximum number of bytes requested per bulk IN transfer
pub const DEFAULT_READ_CHUNK_SIZE: usize = 256;
