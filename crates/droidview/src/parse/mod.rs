//! Dump parsers
//!
//! Two backends produce view hierarchies in different shapes:
//! - `line`: the line-oriented attribute dump served by the forwarded
//!   view server
//! - `xml`: the instrumentation XML dump produced on-device
//!
//! Both yield the same [`crate::tree::ViewTree`] value, with identical
//! unique-id assignment.

pub mod line;
pub mod xml;
