//! Common core for elm-usb
//!
//! This crate drives a PL2303 adapter through any [`UsbTransport`]: the typed
//! control transfer primitives, the bring-up sequencer, the bulk transport with its
//! read-loop thread, the caller-owned [`Session`], and the bounded frame channel
//! that carries received frames to async or blocking consumers.
//!
//! # Example
//!
//! ```
//! use common::Session;
//! use common::test_utils::StubTransport;
//!
//! let session = Session::new(StubTransport::new());
//! session.bring_up().unwrap();
//!
//! let frames = session.start_read_loop(256, 16).unwrap();
//! session.transport().push_inbound(b"ELM327 v1.5\r>".to_vec());
//! assert_eq!(frames.recv_blocking().unwrap(), "ELM327 v1.5");
//!
//! session.send("ATI").unwrap();
//! session.close().unwrap();
//! ```

pub mod bringup;
pub mod bulk;
pub mod channel;
pub mod error;
pub mod logging;
pub mod primitives;
pub mod session;
pub mod test_utils;
pub mod transport;

pub use bringup::run_bringup;
pub use bulk::{ReadLoopHandle, read_loop, resolve_endpoint, spawn_read_loop, write_frame};
pub use channel::{
    DEFAULT_FRAME_QUEUE_CAPACITY, FrameCloser, FrameReceiver, FrameSender, create_frame_channel,
};
pub use error::{Error, Result, TransferError};
pub use logging::setup_logging;
pub use session::{Session, SessionState};
pub use transport::UsbTransport;
