//! Typed change events and acknowledgments.
//!
//! Wire messages from `walstream-proto` are converted into [`ChangeEvent`], a
//! closed sum over the four row-change kinds. A `ServerMessage` that carries
//! no recognized event converts to `None`; the session decides what to do
//! with it.

use std::fmt;

use serde::Serialize;

use walstream_proto::{ClientAck, ClientMessage, ServerMessage, client_message, server_message};

/// Position in the upstream write-ahead log.
///
/// Displayed in WAL notation (`16/B374D848`), serialized as a plain integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct LogPosition(u64);

impl LogPosition {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for LogPosition {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

/// Kind of row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Insert,
    Update,
    Delete,
    Truncate,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row-level change carrying a payload (insert, update, delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowChange {
    pub schema: String,
    pub table: String,
    /// Row data as serialized by the server; opaque to the client.
    pub payload: String,
    pub position: LogPosition,
}

/// A table-level change without payload (truncate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableChange {
    pub schema: String,
    pub table: String,
    pub position: LogPosition,
}

/// One change event received from the CDC server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChangeEvent {
    Insert(RowChange),
    Update(RowChange),
    Delete(RowChange),
    Truncate(TableChange),
}

impl ChangeEvent {
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Insert(_) => EventKind::Insert,
            Self::Update(_) => EventKind::Update,
            Self::Delete(_) => EventKind::Delete,
            Self::Truncate(_) => EventKind::Truncate,
        }
    }

    pub fn schema(&self) -> &str {
        match self {
            Self::Insert(row) | Self::Update(row) | Self::Delete(row) => &row.schema,
            Self::Truncate(table) => &table.schema,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Self::Insert(row) | Self::Update(row) | Self::Delete(row) => &row.table,
            Self::Truncate(table) => &table.table,
        }
    }

    /// Row payload; `None` for truncate.
    pub fn payload(&self) -> Option<&str> {
        match self {
            Self::Insert(row) | Self::Update(row) | Self::Delete(row) => Some(&row.payload),
            Self::Truncate(_) => None,
        }
    }

    pub const fn position(&self) -> LogPosition {
        match self {
            Self::Insert(row) | Self::Update(row) | Self::Delete(row) => row.position,
            Self::Truncate(table) => table.position,
        }
    }

    /// Convert a wire message into a typed event.
    ///
    /// Returns `None` when the message carries no event this client knows
    /// (an empty `oneof`, which is also what a newer server's unknown variant
    /// decodes to).
    pub fn from_message(message: ServerMessage) -> Option<Self> {
        let event = match message.msg? {
            server_message::Msg::Insert(ev) => Self::Insert(RowChange {
                schema: ev.schema,
                table: ev.table,
                payload: ev.json_payload,
                position: ev.pg_lsn.into(),
            }),
            server_message::Msg::Update(ev) => Self::Update(RowChange {
                schema: ev.schema,
                table: ev.table,
                payload: ev.json_payload,
                position: ev.pg_lsn.into(),
            }),
            server_message::Msg::Delete(ev) => Self::Delete(RowChange {
                schema: ev.schema,
                table: ev.table,
                payload: ev.json_payload,
                position: ev.pg_lsn.into(),
            }),
            server_message::Msg::Truncate(ev) => Self::Truncate(TableChange {
                schema: ev.schema,
                table: ev.table,
                position: ev.pg_lsn.into(),
            }),
        };
        Some(event)
    }
}

/// Acknowledgment of a single event by log position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub position: LogPosition,
}

impl Ack {
    pub const fn for_event(event: &ChangeEvent) -> Self {
        Self {
            position: event.position(),
        }
    }
}

impl From<Ack> for ClientMessage {
    fn from(ack: Ack) -> Self {
        Self {
            msg: Some(client_message::Msg::Ack(ClientAck {
                pg_lsn: ack.position.as_u64(),
            })),
        }
    }
}
