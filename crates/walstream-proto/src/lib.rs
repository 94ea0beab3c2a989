//! walstream Protocol Buffers
//!
//! Generated protobuf code for the CDC streaming API.
//!
//! This crate contains:
//! - `PluginService` client, used by the CDC consumer
//! - `PluginService` server, used by test harnesses standing in for the
//!   replication server
//! - `ServerMessage` change events and `ClientMessage` acknowledgments

#![allow(clippy::derive_partial_eq_without_eq)]

/// CDC plugin API definitions.
///
/// All generated types and services are included here.
pub mod plugin {
    tonic::include_proto!("plugin");
}

// Re-export the plugin package at the crate root for convenience
pub use plugin::*;
