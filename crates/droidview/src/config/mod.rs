//! Configuration module for droidview
//!
//! This module contains:
//! - `attrs`: SDK-era attribute-name tables for the dump formats
//! - `timing`: endpoint and timeout configuration for device connections

mod attrs;
mod timing;

pub use attrs::{canonical, AttrNames, CanonicalAttr, Era, CANONICAL_ATTRS};
pub use timing::{DumpServiceConfig, TransportConfig};
