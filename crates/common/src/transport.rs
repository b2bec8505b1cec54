//! USB transport capability
//!
//! The core never talks to a USB library directly. Everything it needs from an
//! opened, configured, interface-claimed device is expressed by [`UsbTransport`]:
//! blocking control and bulk transfers plus the endpoint list of the active
//! alternate setting. The bridge binary implements it on top of libusb; tests use
//! the recording stub in [`crate::test_utils`].
//!
//! Methods take `&self` so one transport can serve the read-loop thread and
//! writers at the same time.

use protocol::{ControlRequest, EndpointDescriptor, UsbError};

pub trait UsbTransport: Send + Sync {
    /// Control IN transfer; returns the data stage (at most `length` bytes)
    fn control_in(&self, request: &ControlRequest, length: usize) -> Result<Vec<u8>, UsbError>;

    /// Control OUT transfer; returns the number of data bytes written
    fn control_out(&self, request: &ControlRequest, data: &[u8]) -> Result<usize, UsbError>;

    /// Bulk IN transfer of up to `max_len` bytes
    ///
    /// Blocks until data arrives. Must fail with [`UsbError::Closed`] once
    /// [`close`](Self::close) has been called rather than block forever.
    fn bulk_in(&self, endpoint: &EndpointDescriptor, max_len: usize) -> Result<Vec<u8>, UsbError>;

    /// Bulk OUT transfer; returns the number of bytes written
    fn bulk_out(&self, endpoint: &EndpointDescriptor, data: &[u8]) -> Result<usize, UsbError>;

    /// Endpoints of the active interface's active alternate setting
    fn endpoints(&self) -> Result<Vec<EndpointDescriptor>, UsbError>;

    /// Release the device. Idempotent; pending and later transfers fail.
    fn close(&self);

    fn is_closed(&self) -> bool;
}
