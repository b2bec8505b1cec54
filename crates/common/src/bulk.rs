//! Bulk transport
//!
//! Endpoint resolution, the single-shot frame write, and the continuous read loop.
//! The read loop is strictly sequential: the next bulk IN transfer is only issued
//! after the previous chunk has been handed to the consumer.

use crate::channel::{FrameCloser, FrameSender};
use crate::error::{Error, Result, TransferError};
use crate::transport::UsbTransport;
use protocol::{Direction, EndpointDescriptor, FrameReassembler};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Find the first bulk endpoint of `direction` on the active alternate setting
pub fn resolve_endpoint<T: UsbTransport + ?Sized>(
    transport: &T,
    direction: Direction,
) -> Result<EndpointDescriptor> {
    let endpoint = transport
        .endpoints()?
        .into_iter()
        .find(|ep| ep.is_bulk(direction))
        .ok_or(Error::EndpointNotFound { direction })?;

    debug!(
        "Resolved bulk {} endpoint {:#04x} (max packet {})",
        direction, endpoint.address, endpoint.max_packet_size
    );
    Ok(endpoint)
}

/// Write `data` to a bulk OUT endpoint in a single transfer
///
/// The whole buffer must be accepted. A short write is reported as
/// [`TransferError::ShortWrite`] and is not retried.
pub fn write_frame<T: UsbTransport + ?Sized>(
    transport: &T,
    endpoint: &EndpointDescriptor,
    data: &[u8],
) -> Result<()> {
    trace!("Bulk OUT {:#04x}: {:02x?}", endpoint.address, data);

    let written = transport
        .bulk_out(endpoint, data)
        .map_err(TransferError::from)?;

    if written != data.len() {
        warn!(
            "Short bulk write on {:#04x}: {} of {} bytes",
            endpoint.address,
            written,
            data.len()
        );
        return Err(TransferError::ShortWrite {
            expected: data.len(),
            written,
        }
        .into());
    }

    Ok(())
}

/// Read chunks from a bulk IN endpoint until a transfer fails or the consumer stops
///
/// Returns `Ok(())` only when `on_chunk` breaks; a failed transfer ends the loop
/// with that error and is never retried here.
pub fn read_loop<T, F>(
    transport: &T,
    endpoint: &EndpointDescriptor,
    max_chunk_len: usize,
    mut on_chunk: F,
) -> std::result::Result<(), TransferError>
where
    T: UsbTransport + ?Sized,
    F: FnMut(&[u8]) -> ControlFlow<()>,
{
    loop {
        let chunk = transport.bulk_in(endpoint, max_chunk_len)?;
        trace!("Bulk IN {:#04x}: {} bytes", endpoint.address, chunk.len());

        if on_chunk(&chunk).is_break() {
            return Ok(());
        }
    }
}

/// Handle to a running read-loop thread
#[derive(Debug)]
pub struct ReadLoopHandle {
    handle: JoinHandle<std::result::Result<(), TransferError>>,
    frames: FrameCloser,
}

impl ReadLoopHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Close the frame channel so a loop blocked on a full queue wakes up
    ///
    /// Frames already queued can still be received.
    pub fn close_frames(&self) {
        if self.frames.close() {
            debug!("Closed frame channel");
        }
    }

    /// Wait for the loop to end and return how it ended
    pub fn join(self) -> Result<()> {
        match self.handle.join() {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::Channel("read loop thread panicked".to_string())),
        }
    }
}

/// Spawn the read loop on a dedicated thread
///
/// Every chunk is fed through a [`FrameReassembler`] and each completed frame is
/// pushed onto `frames`. The loop stops when a transfer fails (including after the
/// session is closed) or when the frame channel closes, either because the
/// consumer dropped its receiver or through [`ReadLoopHandle::close_frames`].
pub fn spawn_read_loop<T: UsbTransport + 'static>(
    transport: Arc<T>,
    endpoint: EndpointDescriptor,
    max_chunk_len: usize,
    frames: FrameSender,
) -> Result<ReadLoopHandle> {
    let closer = frames.closer();
    let handle = std::thread::Builder::new()
        .name("usb-read-loop".to_string())
        .spawn(move || {
            info!(
                "Read loop started on endpoint {:#04x} (chunk size {})",
                endpoint.address, max_chunk_len
            );

            let mut reassembler = FrameReassembler::new();
            let result = read_loop(&*transport, &endpoint, max_chunk_len, |chunk| {
                let mut flow = ControlFlow::Continue(());
                reassembler.feed_with(chunk, |frame| {
                    if flow.is_continue() && frames.send_blocking(frame).is_err() {
                        flow = ControlFlow::Break(());
                    }
                });
                flow
            });

            match &result {
                Ok(()) => info!("Read loop stopped: frame channel closed"),
                Err(e) if e.is_closed() => info!("Read loop stopped: device closed"),
                Err(e) => warn!("Read loop terminated: {}", e),
            }
            result
        })?;

    Ok(ReadLoopHandle {
        handle,
        frames: closer,
    })
}
