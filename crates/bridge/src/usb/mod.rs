//! USB subsystem
//!
//! Binds the core to libusb through rusb:
//! - Adapter discovery and acquisition (open, configure, claim)
//! - The [`RusbTransport`] the session drives
//!
//! All calls here are blocking. The binary runs them on the read-loop thread or
//! through `spawn_blocking`, never directly on the Tokio runtime.

pub mod device;
pub mod transfers;

pub use device::{list_adapters, open_adapter};
pub use transfers::RusbTransport;
