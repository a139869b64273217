//! droidview: Android UI inspection and automation
//!
//! This library provides:
//! - A from-scratch client for the ADB host protocol: device discovery,
//!   shell execution, input injection, framebuffer capture
//! - A client for the forwarded on-device view server
//! - Parsers for the two hierarchy dump formats, producing one uniform
//!   view tree with screen-accurate coordinates
//! - Depth-first queries, traversal and whole-tree comparison
//!
//! # Example
//!
//! ```no_run
//! use droidview::{AdbDevice, InspectorConfig, TransportConfig, ViewInspector};
//!
//! fn main() -> droidview::Result<()> {
//!     let device = AdbDevice::connect("emulator-5554", TransportConfig::default())?;
//!     let mut inspector = ViewInspector::new(device, InspectorConfig::default())?;
//!     inspector.dump()?;
//!     let button = inspector.find_view_with_text("Sign in")?;
//!     inspector.touch_view(button)?;
//!     Ok(())
//! }
//! ```

// Core modules
pub mod error;

// Configuration module
pub mod config;

// Device transport
pub mod adb;
pub mod viewserver;

// Hierarchy model and engines
pub mod coords;
pub mod inspector;
pub mod parse;
pub mod query;
pub mod tree;

// Re-export commonly used types and functions
pub use error::{DroidError, Result};

// Config re-exports
pub use config::{CanonicalAttr, DumpServiceConfig, Era, TransportConfig};

// ADB re-exports
pub use adb::{
    take_snapshot, AdbConnection, AdbDevice, ChannelOrder, DeviceEntry, FramebufferHeader,
    Screenshot, ADB_SERVER_VERSION,
};

// View server re-exports
pub use viewserver::{
    is_view_server_running, start_view_server, stop_view_server, ViewServerClient,
};

// Tree re-exports
pub use tree::{Backend, Bounds, NodeId, ViewNode, ViewTree, Visibility};

// Coordinate re-exports
pub use coords::{absolute_position, parse_window_dump, resolve_tree, Window, WindowManagerState};

// Query re-exports
pub use query::{
    find_by_attribute, find_by_id, find_by_id_or_raise, find_with_content_description,
    find_with_text, traverse, AttrMatch, NodeFormatter,
};

// Inspector re-exports
pub use inspector::{BackendPreference, InspectorConfig, ViewInspector};
