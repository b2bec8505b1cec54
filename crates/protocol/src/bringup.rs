//! PL2303 bring-up script
//!
//! The adapter only becomes usable after a fixed series of vendor and CDC class
//! control transfers. The values were recovered empirically for this chip revision
//! and have no documented meaning; order, request codes, and arguments must be kept
//! exactly as listed. Reads are issued for their effect on the chip's internal state,
//! their data is never inspected.

use crate::types::ControlRequest;

/// One control transfer of the bring-up script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringupStep {
    /// Vendor control IN expecting `length` bytes
    VendorRead { value: u16, index: u16, length: u16 },
    /// Vendor control OUT with an empty data stage
    VendorWrite { value: u16, index: u16 },
    /// SET_LINE_CODING with an opaque payload
    SetLineCoding {
        value: u16,
        index: u16,
        data: &'static [u8],
    },
    /// SET_CONTROL_LINE_STATE with an empty data stage
    SetControlState { value: u16, index: u16 },
}

impl BringupStep {
    /// Setup packet this step sends
    pub fn request(&self) -> ControlRequest {
        match *self {
            BringupStep::VendorRead { value, index, .. } => {
                ControlRequest::vendor_read(value, index)
            }
            BringupStep::VendorWrite { value, index } => ControlRequest::vendor_write(value, index),
            BringupStep::SetLineCoding { value, index, .. } => {
                ControlRequest::set_line_coding(value, index)
            }
            BringupStep::SetControlState { value, index } => {
                ControlRequest::set_control_state(value, index)
            }
        }
    }

    /// Short label used in logs
    pub fn name(&self) -> &'static str {
        match self {
            BringupStep::VendorRead { .. } => "vendor_read",
            BringupStep::VendorWrite { .. } => "vendor_write",
            BringupStep::SetLineCoding { .. } => "set_line_coding",
            BringupStep::SetControlState { .. } => "set_control_state",
        }
    }
}

/// 38400 baud, 1 stop bit, no parity, 7 data bits
const LINE_CODING_7N1: &[u8] = &[0x00, 0x96, 0x00, 0x00, 0x00, 0x00, 0x07];

/// 38400 baud, 1 stop bit, no parity, 8 data bits
const LINE_CODING_8N1: &[u8] = &[0x00, 0x96, 0x00, 0x00, 0x00, 0x00, 0x08];

const fn read(value: u16, length: u16) -> BringupStep {
    BringupStep::VendorRead {
        value,
        index: 0x0000,
        length,
    }
}

const fn write(value: u16, index: u16) -> BringupStep {
    BringupStep::VendorWrite { value, index }
}

const fn control(value: u16) -> BringupStep {
    BringupStep::SetControlState {
        value,
        index: 0x0000,
    }
}

const fn line(data: &'static [u8]) -> BringupStep {
    BringupStep::SetLineCoding {
        value: 0x0000,
        index: 0x0000,
        data,
    }
}

/// The complete bring-up script, in execution order
pub const BRINGUP_SCRIPT: [BringupStep; 33] = [
    // Probe and arm
    read(0x8484, 1),
    write(0x0404, 0x0000),
    read(0x8484, 1),
    read(0x8383, 1),
    read(0x8484, 1),
    write(0x0404, 0x0001),
    read(0x8484, 1),
    read(0x8383, 1),
    // Baud/format registers, control-state toggles with status drains
    write(0x0000, 0x0001),
    write(0x0001, 0x0000),
    write(0x0002, 0x0044),
    read(0x0080, 2),
    write(0x0000, 0x0001),
    control(0x0001),
    read(0x0080, 2),
    write(0x0000, 0x0001),
    control(0x0003),
    read(0x0080, 2),
    write(0x0000, 0x0001),
    read(0x0080, 2),
    write(0x0000, 0x0001),
    // Flow control and first line coding
    write(0x0B0B, 0x0002),
    write(0x0909, 0x0000),
    write(0x0808, 0x0000),
    line(LINE_CODING_7N1),
    control(0x0001),
    control(0x0000),
    // Final line coding and closing drain
    line(LINE_CODING_8N1),
    write(0x0505, 0x1311),
    control(0x0000),
    control(0x0000),
    read(0x0080, 2),
    write(0x0000, 0x0001),
];
