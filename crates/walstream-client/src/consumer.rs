//! Event consumers.
//!
//! The session hands every recognized event to an [`EventConsumer`] before
//! acknowledging it. Consumers run on the session task, so a slow consumer
//! directly slows down the server's delivery rate.

use std::io::{self, Write};
use std::sync::Mutex;

use tracing::warn;

use walstream_core::config::OutputFormat;

use crate::event::ChangeEvent;

/// Downstream sink for change events.
///
/// `consume` must return quickly: the stream is not read again until it has
/// returned and the event has been acknowledged.
pub trait EventConsumer: Send + Sync {
    fn consume(&self, event: &ChangeEvent);
}

impl<F> EventConsumer for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn consume(&self, event: &ChangeEvent) {
        self(event);
    }
}

/// Writes one line per event to a writer (stdout by default).
pub struct ConsoleConsumer<W = io::Stdout> {
    format: OutputFormat,
    writer: Mutex<W>,
}

impl ConsoleConsumer {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(format, io::stdout())
    }
}

impl<W: Write + Send> ConsoleConsumer<W> {
    pub const fn new(format: OutputFormat, writer: W) -> Self {
        Self {
            format,
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<W: Write + Send> EventConsumer for ConsoleConsumer<W> {
    fn consume(&self, event: &ChangeEvent) {
        let line = match render(event, self.format) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, position = %event.position(), "Failed to render event");
                return;
            }
        };
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
            warn!(error = %e, position = %event.position(), "Failed to write event");
        }
    }
}

/// Render a single event as one output line (without newline).
pub fn render(event: &ChangeEvent, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Text => {
            let mut line = format!("{} {}.{}", event.kind(), event.schema(), event.table());
            if let Some(payload) = event.payload() {
                line.push_str(": ");
                line.push_str(payload);
            }
            Ok(line)
        }
        OutputFormat::Json => serde_json::to_string(event),
    }
}
