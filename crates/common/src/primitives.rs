//! Typed control transfer primitives
//!
//! Thin wrappers that build the setup packet for each request the PL2303 needs and
//! check the outcome. No retries: a failed transfer fails the caller immediately.

use crate::error::TransferError;
use crate::transport::UsbTransport;
use protocol::{ControlRequest, LineCoding};
use tracing::{debug, warn};

/// Vendor-specific, device-scoped control IN returning exactly `length` bytes
pub fn vendor_read<T: UsbTransport + ?Sized>(
    transport: &T,
    value: u16,
    index: u16,
    length: u16,
) -> Result<Vec<u8>, TransferError> {
    let request = ControlRequest::vendor_read(value, index);
    debug!(
        "vendor_read: value={:#06x}, index={:#06x}, length={}",
        value, index, length
    );

    let data = transport.control_in(&request, length as usize).map_err(|e| {
        warn!("vendor_read {:#06x} failed: {}", value, e);
        TransferError::from(e)
    })?;

    if data.len() != length as usize {
        return Err(TransferError::ShortRead {
            expected: length as usize,
            actual: data.len(),
        });
    }

    Ok(data)
}

/// Vendor-specific, device-scoped control OUT with an empty data stage
pub fn vendor_write<T: UsbTransport + ?Sized>(
    transport: &T,
    value: u16,
    index: u16,
) -> Result<(), TransferError> {
    let request = ControlRequest::vendor_write(value, index);
    debug!("vendor_write: value={:#06x}, index={:#06x}", value, index);

    control_out(transport, &request, &[])
}

/// CDC SET_LINE_CODING; `data` is sent as-is
pub fn set_line_coding<T: UsbTransport + ?Sized>(
    transport: &T,
    value: u16,
    index: u16,
    data: &[u8],
) -> Result<(), TransferError> {
    let request = ControlRequest::set_line_coding(value, index);
    match LineCoding::from_bytes(data) {
        Ok(coding) => debug!(
            "set_line_coding: {} baud, {} data bits, parity {:?}, stop bits {:?}",
            coding.baud_rate, coding.data_bits, coding.parity, coding.stop_bits
        ),
        Err(_) => debug!(
            "set_line_coding: value={:#06x}, index={:#06x}, data={:02x?}",
            value, index, data
        ),
    }

    control_out(transport, &request, data)
}

/// CDC SET_CONTROL_LINE_STATE (DTR/RTS) with an empty data stage
pub fn set_control_state<T: UsbTransport + ?Sized>(
    transport: &T,
    value: u16,
    index: u16,
) -> Result<(), TransferError> {
    let request = ControlRequest::set_control_state(value, index);
    debug!("set_control_state: value={:#06x}, index={:#06x}", value, index);

    control_out(transport, &request, &[])
}

fn control_out<T: UsbTransport + ?Sized>(
    transport: &T,
    request: &ControlRequest,
    data: &[u8],
) -> Result<(), TransferError> {
    let written = transport.control_out(request, data).map_err(|e| {
        warn!(
            "Control OUT request={:#04x} value={:#06x} failed: {}",
            request.request, request.value, e
        );
        TransferError::from(e)
    })?;

    if written != data.len() {
        return Err(TransferError::ShortWrite {
            expected: data.len(),
            written,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Call, StubTransport};
    use protocol::UsbError;

    #[test]
    fn test_vendor_read_returns_requested_length() {
        let stub = StubTransport::new();
        let data = vendor_read(&stub, 0x8484, 0, 1).unwrap();

        assert_eq!(data.len(), 1);
        assert_eq!(
            stub.calls(),
            vec![Call::ControlIn {
                request: ControlRequest::vendor_read(0x8484, 0),
                length: 1
            }]
        );
    }

    #[test]
    fn test_vendor_read_short_read_fails() {
        let stub = StubTransport::new().with_control_in_len(1);
        let err = vendor_read(&stub, 0x80, 0, 2).unwrap_err();

        assert_eq!(
            err,
            TransferError::ShortRead {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_vendor_write_sends_empty_payload() {
        let stub = StubTransport::new();
        vendor_write(&stub, 0x0404, 0x0001).unwrap();

        assert_eq!(
            stub.calls(),
            vec![Call::ControlOut {
                request: ControlRequest::vendor_write(0x0404, 0x0001),
                data: vec![]
            }]
        );
    }

    #[test]
    fn test_set_line_coding_passes_payload() {
        let stub = StubTransport::new();
        let payload = [0x00, 0x96, 0x00, 0x00, 0x00, 0x00, 0x08];
        set_line_coding(&stub, 0, 0, &payload).unwrap();

        match &stub.calls()[0] {
            Call::ControlOut { request, data } => {
                assert_eq!(request.request, 0x20);
                assert_eq!(data, &payload);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_failure_is_not_retried() {
        let stub = StubTransport::new().fail_call(1, UsbError::Pipe);
        let err = set_control_state(&stub, 0x1, 0).unwrap_err();

        assert_eq!(err, TransferError::Usb(UsbError::Pipe));
        assert_eq!(stub.calls().len(), 1);
    }
}
