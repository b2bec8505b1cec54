//! Adapter session
//!
//! A [`Session`] owns the transport of one acquired adapter for its whole life:
//! bring-up, the read loop, writes, and close. It replaces any ambient device
//! state; callers hold the session and pass it where it is needed.
//!
//! Lifecycle:
//! ```text
//! Opened --bring_up--> Ready --start_read_loop/send--> ...
//!    \                   \
//!     --(step fails)--> Failed         close() from any state --> Closed
//! ```
//! A failed bring-up is never resumed. Close the session and acquire the device
//! again.

use crate::bringup::run_bringup;
use crate::bulk::{self, ReadLoopHandle, spawn_read_loop};
use crate::channel::{FrameReceiver, create_frame_channel};
use crate::error::{Error, Result};
use crate::transport::UsbTransport;
use protocol::{Direction, EndpointDescriptor, encode_frame};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Device acquired, bring-up not yet run
    Opened,
    BringingUp,
    /// Bring-up complete, transport usable
    Ready,
    /// Bring-up failed; the device state is undefined
    Failed,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Opened => "opened",
            SessionState::BringingUp => "bringing up",
            SessionState::Ready => "ready",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct EndpointCache {
    bulk_in: Option<EndpointDescriptor>,
    bulk_out: Option<EndpointDescriptor>,
}

impl EndpointCache {
    fn slot(&mut self, direction: Direction) -> &mut Option<EndpointDescriptor> {
        match direction {
            Direction::In => &mut self.bulk_in,
            Direction::Out => &mut self.bulk_out,
        }
    }
}

pub struct Session<T: UsbTransport + 'static> {
    transport: Arc<T>,
    state: Mutex<SessionState>,
    endpoints: Mutex<EndpointCache>,
    read_loop: Mutex<Option<ReadLoopHandle>>,
}

impl<T: UsbTransport + 'static> Session<T> {
    /// Wrap an opened, configured, interface-claimed transport
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            state: Mutex::new(SessionState::Opened),
            endpoints: Mutex::new(EndpointCache::default()),
            read_loop: Mutex::new(None),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Run the bring-up script
    ///
    /// Allowed once, on a freshly opened session. On failure the session moves to
    /// [`SessionState::Failed`] and refuses further transport operations.
    pub fn bring_up(&self) -> Result<()> {
        {
            let mut state = lock(&self.state);
            if *state != SessionState::Opened {
                return Err(Error::NotReady(format!(
                    "bring-up requires a freshly opened session (state: {})",
                    *state
                )));
            }
            *state = SessionState::BringingUp;
        }

        let result = run_bringup(&*self.transport);

        let mut state = lock(&self.state);
        if *state != SessionState::Closed {
            *state = if result.is_ok() {
                SessionState::Ready
            } else {
                SessionState::Failed
            };
        }
        result
    }

    /// Bulk endpoint of `direction`, scanned once and cached
    pub fn resolve_endpoint(&self, direction: Direction) -> Result<EndpointDescriptor> {
        let mut cache = lock(&self.endpoints);
        let slot = cache.slot(direction);
        if let Some(endpoint) = *slot {
            return Ok(endpoint);
        }

        let endpoint = bulk::resolve_endpoint(&*self.transport, direction)?;
        *slot = Some(endpoint);
        Ok(endpoint)
    }

    /// Drop cached endpoint descriptors; the next operation rescans
    pub fn invalidate_endpoints(&self) {
        debug!("Invalidating cached endpoint descriptors");
        *lock(&self.endpoints) = EndpointCache::default();
    }

    /// Send a command: the text followed by the frame delimiter
    pub fn send(&self, text: &str) -> Result<()> {
        debug!("Sending command {:?}", text);
        let frame = encode_frame(text)?;
        self.write_frame(&frame)
    }

    /// Write raw bytes to the bulk OUT endpoint in one transfer
    pub fn write_frame(&self, data: &[u8]) -> Result<()> {
        self.ensure_ready()?;
        let endpoint = self.resolve_endpoint(Direction::Out)?;
        bulk::write_frame(&*self.transport, &endpoint, data)
    }

    /// Start the read loop and return the frame stream
    ///
    /// The loop reads up to `max_chunk_len` bytes per transfer and buffers at most
    /// `queue_capacity` frames. There is no stop operation; closing the session ends
    /// the loop and then the stream.
    pub fn start_read_loop(
        &self,
        max_chunk_len: usize,
        queue_capacity: usize,
    ) -> Result<FrameReceiver> {
        self.ensure_ready()?;

        let mut read_loop = lock(&self.read_loop);
        if read_loop.is_some() {
            return Err(Error::NotReady("read loop already started".to_string()));
        }

        let endpoint = self.resolve_endpoint(Direction::In)?;
        let (tx, rx) = create_frame_channel(queue_capacity);
        *read_loop = Some(spawn_read_loop(
            self.transport.clone(),
            endpoint,
            max_chunk_len,
            tx,
        )?);

        Ok(rx)
    }

    /// Whether a started read loop has already ended
    pub fn read_loop_finished(&self) -> bool {
        lock(&self.read_loop)
            .as_ref()
            .is_some_and(ReadLoopHandle::is_finished)
    }

    /// Close the device
    ///
    /// Safe in any state, including mid bring-up or with the read loop running, and
    /// idempotent. Closes the frame channel so a loop blocked on a full queue wakes
    /// up; frames already queued stay receivable. Waits for the read loop to observe
    /// the close. Returns the read
    /// loop's error if it had already ended for another reason.
    pub fn close(&self) -> Result<()> {
        {
            let mut state = lock(&self.state);
            if *state == SessionState::Closed {
                return Ok(());
            }
            *state = SessionState::Closed;
        }

        info!("Closing session");
        self.transport.close();

        let handle = lock(&self.read_loop).take();
        if let Some(handle) = &handle {
            handle.close_frames();
        }
        match handle.map(ReadLoopHandle::join) {
            Some(Err(Error::Transfer(e))) if e.is_closed() => Ok(()),
            Some(Err(e)) => {
                warn!("Read loop had failed before close: {}", e);
                Err(e)
            }
            _ => Ok(()),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        match *lock(&self.state) {
            SessionState::Ready => Ok(()),
            state => Err(Error::NotReady(format!("session is {}", state))),
        }
    }
}

impl<T: UsbTransport + 'static> Drop for Session<T> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!("Error while closing dropped session: {}", e);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Call, StubTransport};
    use protocol::{BRINGUP_SCRIPT, UsbError};

    fn ready_session() -> Session<StubTransport> {
        let session = Session::new(StubTransport::new());
        session.bring_up().unwrap();
        session
    }

    #[test]
    fn test_send_before_bring_up_is_refused() {
        let session = Session::new(StubTransport::new());
        assert!(matches!(session.send("ATZ"), Err(Error::NotReady(_))));
        assert!(session.transport().calls().is_empty());
    }

    #[test]
    fn test_send_appends_delimiter() {
        let session = ready_session();
        session.send("ATI").unwrap();

        assert_eq!(
            session.transport().calls().last(),
            Some(&Call::BulkOut {
                endpoint: 0x02,
                data: b"ATI\r".to_vec()
            })
        );
    }

    #[test]
    fn test_failed_bring_up_is_terminal() {
        let session = Session::new(StubTransport::new().fail_call(5, UsbError::Pipe));
        assert!(matches!(
            session.bring_up(),
            Err(Error::Bringup { step: 5, .. })
        ));
        assert_eq!(session.state(), SessionState::Failed);

        // Neither resumable nor usable
        assert!(matches!(session.bring_up(), Err(Error::NotReady(_))));
        assert!(matches!(session.send("ATZ"), Err(Error::NotReady(_))));
        assert_eq!(session.transport().calls().len(), 5);
    }

    #[test]
    fn test_endpoints_cached_until_invalidated() {
        let session = ready_session();
        session.send("A").unwrap();
        session.send("B").unwrap();
        assert_eq!(session.transport().endpoint_queries(), 1);

        session.invalidate_endpoints();
        session.send("C").unwrap();
        assert_eq!(session.transport().endpoint_queries(), 2);
    }

    #[test]
    fn test_read_loop_only_once() {
        let session = ready_session();
        let _frames = session.start_read_loop(256, 8).unwrap();
        assert!(matches!(
            session.start_read_loop(256, 8),
            Err(Error::NotReady(_))
        ));
        session.close().unwrap();
    }

    #[test]
    fn test_close_is_idempotent() {
        let session = ready_session();
        session.close().unwrap();
        session.close().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.transport().is_closed());
        assert!(matches!(session.send("ATZ"), Err(Error::NotReady(_))));
    }

    #[test]
    fn test_close_before_bring_up_fails_it() {
        let session = Session::new(StubTransport::new());
        session.close().unwrap();
        assert!(session.bring_up().is_err());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.transport().calls().len() < BRINGUP_SCRIPT.len());
    }
}
