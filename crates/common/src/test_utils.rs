//! Test utilities for elm-usb
//!
//! Provides a recording [`StubTransport`] and helper functions for testing across
//! crates without a physical adapter.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{Call, StubTransport};
//! use common::primitives::vendor_write;
//!
//! let stub = StubTransport::new();
//! vendor_write(&stub, 0x0404, 0x0000).unwrap();
//! assert!(matches!(stub.calls()[0], Call::ControlOut { .. }));
//! ```

use crate::transport::UsbTransport;
use protocol::{ControlRequest, Direction, EndpointDescriptor, TransferKind, UsbError};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// One transfer recorded by [`StubTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ControlIn {
        request: ControlRequest,
        length: usize,
    },
    ControlOut {
        request: ControlRequest,
        data: Vec<u8>,
    },
    BulkIn {
        endpoint: u8,
        max_len: usize,
    },
    BulkOut {
        endpoint: u8,
        data: Vec<u8>,
    },
}

/// Bulk endpoint descriptor with the direction taken from `address`
pub fn bulk_endpoint(address: u8) -> EndpointDescriptor {
    EndpointDescriptor {
        address,
        direction: Direction::from_address(address),
        kind: TransferKind::Bulk,
        max_packet_size: 64,
    }
}

/// Endpoint layout of a PL2303: interrupt status IN, bulk OUT, bulk IN
pub fn pl2303_endpoints() -> Vec<EndpointDescriptor> {
    vec![
        EndpointDescriptor {
            address: 0x81,
            direction: Direction::In,
            kind: TransferKind::Interrupt,
            max_packet_size: 10,
        },
        bulk_endpoint(0x02),
        bulk_endpoint(0x83),
    ]
}

/// In-memory transport that records every transfer
///
/// Control transfers succeed by default. Bulk IN transfers are served from a queue
/// filled with [`push_inbound`](Self::push_inbound) and block while it is empty,
/// until [`close`](UsbTransport::close) is called.
pub struct StubTransport {
    calls: Mutex<Vec<Call>>,
    failures: HashMap<usize, UsbError>,
    control_in_len: Option<usize>,
    bulk_out_written: Option<usize>,
    endpoints: Vec<EndpointDescriptor>,
    endpoint_queries: AtomicUsize,
    inbound: Mutex<VecDeque<Result<Vec<u8>, UsbError>>>,
    inbound_ready: Condvar,
    closed: AtomicBool,
}

impl Default for StubTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StubTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: HashMap::new(),
            control_in_len: None,
            bulk_out_written: None,
            endpoints: pl2303_endpoints(),
            endpoint_queries: AtomicUsize::new(0),
            inbound: Mutex::new(VecDeque::new()),
            inbound_ready: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Fail the `n`th transfer (1-based, counting every kind) with `error`
    pub fn fail_call(mut self, n: usize, error: UsbError) -> Self {
        self.failures.insert(n, error);
        self
    }

    /// Cap every control IN data stage at `len` bytes
    pub fn with_control_in_len(mut self, len: usize) -> Self {
        self.control_in_len = Some(len);
        self
    }

    /// Report `written` bytes for every bulk OUT transfer
    pub fn with_bulk_out_written(mut self, written: usize) -> Self {
        self.bulk_out_written = Some(written);
        self
    }

    pub fn with_endpoints(mut self, endpoints: Vec<EndpointDescriptor>) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Queue a chunk for a future bulk IN transfer
    pub fn push_inbound(&self, chunk: Vec<u8>) {
        lock(&self.inbound).push_back(Ok(chunk));
        self.inbound_ready.notify_all();
    }

    /// Queue a failing bulk IN transfer
    pub fn push_inbound_error(&self, error: UsbError) {
        lock(&self.inbound).push_back(Err(error));
        self.inbound_ready.notify_all();
    }

    /// Every transfer issued so far, in order
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    /// Number of times the endpoint list was scanned
    pub fn endpoint_queries(&self) -> usize {
        self.endpoint_queries.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) -> Result<(), UsbError> {
        if self.is_closed() {
            return Err(UsbError::Closed);
        }

        let mut calls = lock(&self.calls);
        calls.push(call);
        match self.failures.get(&calls.len()) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl UsbTransport for StubTransport {
    fn control_in(&self, request: &ControlRequest, length: usize) -> Result<Vec<u8>, UsbError> {
        self.record(Call::ControlIn {
            request: *request,
            length,
        })?;
        let len = self.control_in_len.map_or(length, |cap| cap.min(length));
        Ok(vec![0u8; len])
    }

    fn control_out(&self, request: &ControlRequest, data: &[u8]) -> Result<usize, UsbError> {
        self.record(Call::ControlOut {
            request: *request,
            data: data.to_vec(),
        })?;
        Ok(data.len())
    }

    fn bulk_in(&self, endpoint: &EndpointDescriptor, max_len: usize) -> Result<Vec<u8>, UsbError> {
        self.record(Call::BulkIn {
            endpoint: endpoint.address,
            max_len,
        })?;

        let mut inbound = lock(&self.inbound);
        loop {
            if self.is_closed() {
                return Err(UsbError::Closed);
            }
            match inbound.pop_front() {
                Some(Ok(mut chunk)) => {
                    if chunk.len() > max_len {
                        let rest = chunk.split_off(max_len);
                        inbound.push_front(Ok(rest));
                    }
                    return Ok(chunk);
                }
                Some(Err(error)) => return Err(error),
                None => {
                    inbound = self
                        .inbound_ready
                        .wait(inbound)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn bulk_out(&self, endpoint: &EndpointDescriptor, data: &[u8]) -> Result<usize, UsbError> {
        self.record(Call::BulkOut {
            endpoint: endpoint.address,
            data: data.to_vec(),
        })?;
        Ok(self.bulk_out_written.unwrap_or(data.len()))
    }

    fn endpoints(&self) -> Result<Vec<EndpointDescriptor>, UsbError> {
        if self.is_closed() {
            return Err(UsbError::Closed);
        }
        self.endpoint_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.endpoints.clone())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Take the queue lock so a bulk_in between its closed check and wait sees the wakeup
        let _guard = lock(&self.inbound);
        self.inbound_ready.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
///
/// # Example
/// ```ignore
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// #[tokio::test]
/// async fn test_with_timeout() {
///     let frame = with_timeout(DEFAULT_TEST_TIMEOUT, frames.recv()).await.unwrap();
/// }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
