//! walstream Core Library
//!
//! Shared functionality for walstream components:
//! - Configuration resolution and hierarchy
//! - Tracing/logging initialization
//! - Common error types

pub mod config;
pub mod error;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
