//! Session handler: one CDC session from dial to teardown.
//!
//! State machine: `Dialing -> SessionOpening -> Active -> {closed by remote,
//! closed by error, cancelled}`. Every closed state returns to the caller;
//! the transport and stream are owned by [`SessionHandler::connect_and_serve`]
//! and dropped on return, whichever path was taken.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::consumer::EventConsumer;
use crate::error::ClientError;
use crate::event::{Ack, ChangeEvent, LogPosition};
use crate::transport::{Connector, EventStream, Transport};

/// Counters for one session, logged when it ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SessionStats {
    /// Recognized events received.
    pub received: u64,
    pub acknowledged: u64,
    /// Messages without a recognized event (not acknowledged).
    pub skipped: u64,
    pub last_acked: Option<LogPosition>,
}

impl SessionStats {
    fn record_ack(&mut self, position: LogPosition) {
        if let Some(last) = self.last_acked.filter(|last| position <= *last) {
            warn!(%position, %last, "Log position did not advance");
        }
        self.acknowledged += 1;
        self.last_acked = Some(position);
    }
}

/// Runs CDC sessions against a connector, handing events to a consumer.
pub struct SessionHandler<C> {
    connector: C,
    consumer: Arc<dyn EventConsumer>,
}

impl<C: Connector> SessionHandler<C> {
    pub fn new(connector: C, consumer: Arc<dyn EventConsumer>) -> Self {
        Self {
            connector,
            consumer,
        }
    }

    /// Dial, open a session and serve it until it fails or `cancel` fires.
    ///
    /// Returns `Ok(())` only when cancelled. Failures are
    /// [`ClientError::Dial`], [`ClientError::SessionOpen`] or
    /// [`ClientError::Stream`]; end-of-stream from the server is a stream
    /// error too.
    pub async fn connect_and_serve(&self, cancel: &CancellationToken) -> Result<(), ClientError> {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let mut transport = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            transport = self.connector.dial() => transport?,
        };

        let mut stream = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            stream = transport.open_session() => stream?,
        };

        info!("Session active, listening for events");

        let mut stats = SessionStats::default();
        let result = self.serve(&mut stream, cancel, &mut stats).await;
        info!(
            received = stats.received,
            acknowledged = stats.acknowledged,
            skipped = stats.skipped,
            last_acked = %stats.last_acked.map(|p| p.to_string()).unwrap_or_default(),
            cancelled = result.is_ok(),
            "Session ended"
        );
        result
    }

    /// Receive/dispatch/ack loop.
    ///
    /// At most one event is unacknowledged at any time: the next receive
    /// starts only after the previous event's ack has been sent.
    async fn serve<S: EventStream>(
        &self,
        stream: &mut S,
        cancel: &CancellationToken,
        stats: &mut SessionStats,
    ) -> Result<(), ClientError> {
        loop {
            let message = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                message = stream.recv() => message?,
            };

            let Some(event) = ChangeEvent::from_message(message) else {
                stats.skipped += 1;
                warn!(skipped = stats.skipped, "Skipping message without a recognized event");
                continue;
            };
            stats.received += 1;

            self.dispatch(&event);

            let ack = Ack::for_event(&event);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                sent = stream.send(ack) => sent?,
            }
            stats.record_ack(ack.position);
            debug!(position = %ack.position, "Acknowledged");
        }
    }

    fn dispatch(&self, event: &ChangeEvent) {
        match event {
            ChangeEvent::Insert(row) | ChangeEvent::Update(row) | ChangeEvent::Delete(row) => {
                debug!(
                    kind = %event.kind(),
                    schema = %row.schema,
                    table = %row.table,
                    position = %row.position,
                    payload_bytes = row.payload.len(),
                    "Dispatching row change"
                );
            }
            ChangeEvent::Truncate(table) => {
                debug!(
                    schema = %table.schema,
                    table = %table.table,
                    position = %table.position,
                    "Dispatching truncate"
                );
            }
        }
        self.consumer.consume(event);
    }
}
