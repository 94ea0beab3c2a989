//! walstream CDC Client Library
//!
//! Consumes change events from a CDC server over a bidirectional gRPC
//! session and acknowledges each one by WAL position:
//! - `session`: one session end-to-end (dial, open, receive/dispatch/ack)
//! - `manager`: unbounded reconnection around the session handler
//! - `transport`: connector/stream seam and the gRPC implementation
//! - `event`, `consumer`: typed events and downstream sinks

pub mod consumer;
pub mod error;
pub mod event;
pub mod manager;
pub mod reconnect;
pub mod session;
pub mod transport;

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod test_support;

pub use consumer::{ConsoleConsumer, EventConsumer};
pub use error::ClientError;
pub use event::{Ack, ChangeEvent, EventKind, LogPosition};
pub use manager::ConnectionManager;
pub use reconnect::ReconnectPolicy;
pub use session::SessionHandler;
pub use transport::{Connector, EventStream, GrpcConnector, Transport};
