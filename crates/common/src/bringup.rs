//! Bring-up sequencer
//!
//! Executes [`BRINGUP_SCRIPT`] against a transport, strictly in order, each step
//! completing before the next is issued. The first failure aborts the sequence;
//! the device is then in an undefined state and the session must be closed and
//! re-acquired from scratch.

use crate::error::{Error, Result, TransferError};
use crate::primitives::{set_control_state, set_line_coding, vendor_read, vendor_write};
use crate::transport::UsbTransport;
use protocol::{BRINGUP_SCRIPT, BringupStep};
use tracing::{debug, info, warn};

/// Run the full bring-up script
pub fn run_bringup<T: UsbTransport + ?Sized>(transport: &T) -> Result<()> {
    info!("Starting PL2303 bring-up ({} steps)", BRINGUP_SCRIPT.len());

    for (i, step) in BRINGUP_SCRIPT.iter().enumerate() {
        let number = i + 1;
        debug!("Bring-up step {}/{}: {:?}", number, BRINGUP_SCRIPT.len(), step);

        execute_step(transport, step).map_err(|source| {
            warn!("Bring-up aborted at step {} ({}): {}", number, step.name(), source);
            Error::Bringup {
                step: number,
                name: step.name(),
                source,
            }
        })?;
    }

    info!("PL2303 bring-up complete");
    Ok(())
}

fn execute_step<T: UsbTransport + ?Sized>(
    transport: &T,
    step: &BringupStep,
) -> std::result::Result<(), TransferError> {
    match *step {
        // Status drains; the returned bytes are not inspected
        BringupStep::VendorRead {
            value,
            index,
            length,
        } => vendor_read(transport, value, index, length).map(|_| ()),
        BringupStep::VendorWrite { value, index } => vendor_write(transport, value, index),
        BringupStep::SetLineCoding { value, index, data } => {
            set_line_coding(transport, value, index, data)
        }
        BringupStep::SetControlState { value, index } => set_control_state(transport, value, index),
    }
}
