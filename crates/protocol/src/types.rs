//! USB type definitions
//!
//! This module defines the USB-related value types shared by the transport
//! implementations: control request descriptions, endpoint descriptors, and the
//! closed set of transfer failure conditions.

use crate::constants::{
    SET_CONTROL_REQUEST, SET_LINE_REQUEST, VENDOR_READ_REQUEST, VENDOR_WRITE_REQUEST,
};
use std::fmt;
use thiserror::Error;

/// Transfer direction, as seen from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Device to host
    In,
    /// Host to device
    Out,
}

impl Direction {
    /// Direction encoded in bit 7 of an endpoint address or bmRequestType
    pub fn from_address(address: u8) -> Self {
        if address & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}

/// Endpoint transfer style (bmAttributes bits 0..1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// Endpoint descriptor of the active alternate setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// Endpoint address (includes direction bit)
    pub address: u8,
    /// Transfer direction
    pub direction: Direction,
    /// Transfer style
    pub kind: TransferKind,
    /// wMaxPacketSize
    pub max_packet_size: u16,
}

impl EndpointDescriptor {
    /// Endpoint number without the direction bit
    pub fn number(&self) -> u8 {
        self.address & 0x0F
    }

    /// Whether this is a bulk endpoint of the given direction
    pub fn is_bulk(&self, direction: Direction) -> bool {
        self.kind == TransferKind::Bulk && self.direction == direction
    }
}

/// bmRequestType type field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Standard,
    Class,
    Vendor,
}

/// bmRequestType recipient field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

/// A control transfer setup packet without its data stage
///
/// The payload (OUT) or expected length (IN) travels alongside the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub direction: Direction,
    pub request_type: RequestType,
    pub recipient: Recipient,
    /// bRequest
    pub request: u8,
    /// wValue
    pub value: u16,
    /// wIndex
    pub index: u16,
}

impl ControlRequest {
    /// Vendor-specific, device-scoped IN request
    pub const fn vendor_read(value: u16, index: u16) -> Self {
        Self {
            direction: Direction::In,
            request_type: RequestType::Vendor,
            recipient: Recipient::Device,
            request: VENDOR_READ_REQUEST,
            value,
            index,
        }
    }

    /// Vendor-specific, device-scoped OUT request
    pub const fn vendor_write(value: u16, index: u16) -> Self {
        Self {
            direction: Direction::Out,
            request_type: RequestType::Vendor,
            recipient: Recipient::Device,
            request: VENDOR_WRITE_REQUEST,
            value,
            index,
        }
    }

    /// Class-specific, interface-scoped SET_LINE_CODING
    pub const fn set_line_coding(value: u16, index: u16) -> Self {
        Self {
            direction: Direction::Out,
            request_type: RequestType::Class,
            recipient: Recipient::Interface,
            request: SET_LINE_REQUEST,
            value,
            index,
        }
    }

    /// Class-specific, interface-scoped SET_CONTROL_LINE_STATE
    pub const fn set_control_state(value: u16, index: u16) -> Self {
        Self {
            direction: Direction::Out,
            request_type: RequestType::Class,
            recipient: Recipient::Interface,
            request: SET_CONTROL_REQUEST,
            value,
            index,
        }
    }

    /// Encoded bmRequestType byte
    pub fn request_type_byte(&self) -> u8 {
        let direction = match self.direction {
            Direction::In => 0x80,
            Direction::Out => 0x00,
        };
        let kind = match self.request_type {
            RequestType::Standard => 0x00,
            RequestType::Class => 0x01 << 5,
            RequestType::Vendor => 0x02 << 5,
        };
        let recipient = match self.recipient {
            Recipient::Device => 0x00,
            Recipient::Interface => 0x01,
            Recipient::Endpoint => 0x02,
            Recipient::Other => 0x03,
        };
        direction | kind | recipient
    }
}

/// USB error conditions
///
/// Maps the failure modes of the underlying USB library onto a closed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsbError {
    /// Transfer timed out
    #[error("transfer timed out")]
    Timeout,
    /// Endpoint stalled (protocol error)
    #[error("endpoint stalled")]
    Pipe,
    /// Device was disconnected
    #[error("device disconnected")]
    NoDevice,
    /// Device or endpoint not found
    #[error("device or endpoint not found")]
    NotFound,
    /// Device is busy
    #[error("device busy")]
    Busy,
    /// Buffer overflow
    #[error("buffer overflow")]
    Overflow,
    /// I/O error
    #[error("I/O error")]
    Io,
    /// Invalid parameter
    #[error("invalid parameter")]
    InvalidParam,
    /// Access denied (permissions)
    #[error("access denied")]
    Access,
    /// The session was closed while the transfer was pending
    #[error("device closed")]
    Closed,
    /// Other error with message
    #[error("{message}")]
    Other { message: String },
}
