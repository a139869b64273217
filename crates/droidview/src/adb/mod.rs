//! ADB host-protocol module for Android device control
//!
//! This module provides:
//! - `connection`: wire client for the host protocol (framing, handshake,
//!   transport binding, shell streams)
//! - `device`: device-scoped operations (properties, input injection,
//!   activity starts, forwarding)
//! - `screenshot`: framebuffer capture

mod connection;
mod device;
mod screenshot;

pub use connection::{AdbConnection, DeviceEntry, ADB_SERVER_VERSION};
pub use device::AdbDevice;
pub use screenshot::{take_snapshot, ChannelOrder, FramebufferHeader, Screenshot};
