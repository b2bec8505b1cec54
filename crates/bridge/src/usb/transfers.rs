//! libusb-backed transport
//!
//! [`RusbTransport`] implements [`UsbTransport`] over an opened, claimed rusb
//! device handle and maps rusb errors onto the closed [`UsbError`] set.
//!
//! libusb's synchronous calls cannot be interrupted from another thread, so bulk IN
//! transfers are issued with a short poll interval and re-issued on timeout. Each
//! timeout is a chance to observe [`close`](UsbTransport::close), which is how the
//! read-loop thread terminates. Control transfers and bulk OUT transfers use the
//! configured timeouts, where zero means unlimited.

use super::device::reattach_kernel_driver;
use crate::config::UsbSettings;
use common::UsbTransport;
use protocol::{ControlRequest, Direction, EndpointDescriptor, TransferKind, UsbError};
use rusb::{Context, DeviceHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Default bulk IN poll interval (100 ms)
pub const DEFAULT_READ_POLL: Duration = Duration::from_millis(100);

/// Timeouts applied to each kind of transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferTimeouts {
    /// Control transfers; zero waits forever
    pub control: Duration,
    /// Bulk OUT transfers; zero waits forever
    pub write: Duration,
    /// Bulk IN poll interval
    pub read_poll: Duration,
}

impl Default for TransferTimeouts {
    fn default() -> Self {
        Self {
            control: Duration::ZERO,
            write: Duration::ZERO,
            read_poll: DEFAULT_READ_POLL,
        }
    }
}

impl TransferTimeouts {
    pub fn from_settings(settings: &UsbSettings) -> Self {
        Self {
            control: Duration::from_millis(settings.control_timeout_ms),
            write: Duration::from_millis(settings.write_timeout_ms),
            read_poll: Duration::from_millis(settings.read_poll_ms),
        }
    }
}

/// Transport over a claimed PL2303 interface
pub struct RusbTransport {
    handle: DeviceHandle<Context>,
    interface: u8,
    alt_setting: u8,
    kernel_driver_detached: bool,
    product: Option<String>,
    timeouts: TransferTimeouts,
    closed: AtomicBool,
}

impl RusbTransport {
    /// Wrap a handle whose `interface` is already claimed
    pub fn new(
        handle: DeviceHandle<Context>,
        interface: u8,
        alt_setting: u8,
        kernel_driver_detached: bool,
        product: Option<String>,
        timeouts: TransferTimeouts,
    ) -> Self {
        Self {
            handle,
            interface,
            alt_setting,
            kernel_driver_detached,
            product,
            timeouts,
            closed: AtomicBool::new(false),
        }
    }

    /// Product string read during acquisition
    pub fn product(&self) -> Option<&str> {
        self.product.as_deref()
    }

    fn check_open(&self) -> Result<(), UsbError> {
        if self.is_closed() {
            Err(UsbError::Closed)
        } else {
            Ok(())
        }
    }

    /// Map a failed transfer, reporting `Closed` once the transport was closed
    fn transfer_error(&self, err: rusb::Error) -> UsbError {
        if self.is_closed() {
            UsbError::Closed
        } else {
            map_rusb_error(err)
        }
    }
}

impl UsbTransport for RusbTransport {
    fn control_in(&self, request: &ControlRequest, length: usize) -> Result<Vec<u8>, UsbError> {
        self.check_open()?;
        trace!(
            "Control IN: request_type={:#04x}, request={:#04x}, value={:#06x}, index={:#06x}, length={}",
            request.request_type_byte(),
            request.request,
            request.value,
            request.index,
            length
        );

        let mut buffer = vec![0u8; length];
        let len = self
            .handle
            .read_control(
                request.request_type_byte(),
                request.request,
                request.value,
                request.index,
                &mut buffer,
                self.timeouts.control,
            )
            .map_err(|e| self.transfer_error(e))?;
        buffer.truncate(len);
        Ok(buffer)
    }

    fn control_out(&self, request: &ControlRequest, data: &[u8]) -> Result<usize, UsbError> {
        self.check_open()?;
        trace!(
            "Control OUT: request_type={:#04x}, request={:#04x}, value={:#06x}, index={:#06x}, data={:02x?}",
            request.request_type_byte(),
            request.request,
            request.value,
            request.index,
            data
        );

        self.handle
            .write_control(
                request.request_type_byte(),
                request.request,
                request.value,
                request.index,
                data,
                self.timeouts.control,
            )
            .map_err(|e| self.transfer_error(e))
    }

    fn bulk_in(&self, endpoint: &EndpointDescriptor, max_len: usize) -> Result<Vec<u8>, UsbError> {
        // A timed-out libusb transfer drops whatever it had received, so each poll
        // asks for at most one packet: a packet is either whole or not there.
        let len = poll_length(max_len, endpoint.max_packet_size);
        let mut buffer = vec![0u8; len];

        loop {
            self.check_open()?;
            match self
                .handle
                .read_bulk(endpoint.address, &mut buffer, self.timeouts.read_poll)
            {
                Ok(n) => {
                    buffer.truncate(n);
                    return Ok(buffer);
                }
                Err(rusb::Error::Timeout) => continue,
                Err(e) => return Err(self.transfer_error(e)),
            }
        }
    }

    fn bulk_out(&self, endpoint: &EndpointDescriptor, data: &[u8]) -> Result<usize, UsbError> {
        self.check_open()?;
        self.handle
            .write_bulk(endpoint.address, data, self.timeouts.write)
            .map_err(|e| self.transfer_error(e))
    }

    fn endpoints(&self) -> Result<Vec<EndpointDescriptor>, UsbError> {
        self.check_open()?;
        let config = self
            .handle
            .device()
            .active_config_descriptor()
            .map_err(|e| self.transfer_error(e))?;

        let setting = config
            .interfaces()
            .filter(|interface| interface.number() == self.interface)
            .flat_map(|interface| interface.descriptors())
            .find(|setting| setting.setting_number() == self.alt_setting)
            .ok_or(UsbError::NotFound)?;

        let endpoints: Vec<EndpointDescriptor> = setting
            .endpoint_descriptors()
            .map(|ep| EndpointDescriptor {
                address: ep.address(),
                direction: map_direction(ep.direction()),
                kind: map_transfer_kind(ep.transfer_type()),
                max_packet_size: ep.max_packet_size(),
            })
            .collect();

        debug!(
            "Interface {} alt {} has {} endpoint(s)",
            self.interface,
            self.alt_setting,
            endpoints.len()
        );
        Ok(endpoints)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self.handle.release_interface(self.interface) {
            warn!("Failed to release interface {}: {}", self.interface, e);
        }
        if self.kernel_driver_detached {
            reattach_kernel_driver(&self.handle, self.interface);
        }
        debug!("Closed adapter");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Length requested by one bulk IN poll
fn poll_length(max_len: usize, max_packet_size: u16) -> usize {
    match max_packet_size {
        0 => max_len,
        packet => max_len.min(packet as usize),
    }
}

fn map_direction(direction: rusb::Direction) -> Direction {
    match direction {
        rusb::Direction::In => Direction::In,
        rusb::Direction::Out => Direction::Out,
    }
}

fn map_transfer_kind(kind: rusb::TransferType) -> TransferKind {
    match kind {
        rusb::TransferType::Control => TransferKind::Control,
        rusb::TransferType::Isochronous => TransferKind::Isochronous,
        rusb::TransferType::Bulk => TransferKind::Bulk,
        rusb::TransferType::Interrupt => TransferKind::Interrupt,
    }
}

/// Map rusb::Error to protocol::UsbError
pub fn map_rusb_error(err: rusb::Error) -> UsbError {
    match err {
        rusb::Error::Timeout => UsbError::Timeout,
        rusb::Error::Pipe => UsbError::Pipe,
        rusb::Error::NoDevice => UsbError::NoDevice,
        rusb::Error::NotFound => UsbError::NotFound,
        rusb::Error::Busy => UsbError::Busy,
        rusb::Error::Overflow => UsbError::Overflow,
        rusb::Error::Io => UsbError::Io,
        rusb::Error::InvalidParam => UsbError::InvalidParam,
        rusb::Error::Access => UsbError::Access,
        _ => UsbError::Other {
            message: err.to_string(),
        },
    }
}
