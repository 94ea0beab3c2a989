//! Scripted transport doubles shared by session and manager tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::time::Instant;

use walstream_proto::{
    DeleteEvent, InsertEvent, ServerMessage, TruncateEvent, UpdateEvent, server_message,
};

use crate::consumer::EventConsumer;
use crate::error::ClientError;
use crate::event::{Ack, ChangeEvent, EventKind};
use crate::transport::{Connector, EventStream, Transport};

pub fn insert(schema: &str, table: &str, payload: &str, lsn: u64) -> ServerMessage {
    ServerMessage {
        msg: Some(server_message::Msg::Insert(InsertEvent {
            schema: schema.into(),
            table: table.into(),
            json_payload: payload.into(),
            pg_lsn: lsn,
        })),
    }
}

pub fn update(lsn: u64) -> ServerMessage {
    ServerMessage {
        msg: Some(server_message::Msg::Update(UpdateEvent {
            schema: "public".into(),
            table: "users".into(),
            json_payload: format!(r#"{{"lsn":{lsn}}}"#),
            pg_lsn: lsn,
        })),
    }
}

pub fn delete(lsn: u64) -> ServerMessage {
    ServerMessage {
        msg: Some(server_message::Msg::Delete(DeleteEvent {
            schema: "public".into(),
            table: "users".into(),
            json_payload: r#"{"id":1}"#.into(),
            pg_lsn: lsn,
        })),
    }
}

pub fn truncate(schema: &str, table: &str, lsn: u64) -> ServerMessage {
    ServerMessage {
        msg: Some(server_message::Msg::Truncate(TruncateEvent {
            schema: schema.into(),
            table: table.into(),
            pg_lsn: lsn,
        })),
    }
}

pub const fn unrecognized() -> ServerMessage {
    ServerMessage { msg: None }
}

/// One scripted receive result.
#[derive(Debug, Clone)]
pub enum Step {
    Message(ServerMessage),
    Fail(String),
    /// Block forever, like a server that went quiet.
    Stall,
}

/// How the scripted stream handles outbound acks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    Deliver,
    Fail,
    /// Never completes, like a full outbound buffer.
    Stall,
}

/// Behavior of one connection attempt.
#[derive(Debug, Clone)]
pub enum Attempt {
    RefuseDial,
    RejectSession,
    /// Receive the steps in order, then report end-of-stream.
    Serve { steps: Vec<Step>, acks: AckMode },
}

impl Attempt {
    pub fn serve(messages: Vec<ServerMessage>) -> Self {
        Self::Serve {
            steps: messages.into_iter().map(Step::Message).collect(),
            acks: AckMode::Deliver,
        }
    }
}

/// What happened, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trace {
    Dial,
    Received(Option<u64>),
    Dispatched {
        kind: EventKind,
        schema: String,
        table: String,
        payload: Option<String>,
        lsn: u64,
    },
    Acked(u64),
    TransportClosed,
    StreamClosed,
}

#[derive(Debug, Default)]
pub struct Recorder {
    pub trace: Mutex<Vec<Trace>>,
    pub dial_times: Mutex<Vec<Instant>>,
    pub transports_open: AtomicUsize,
    /// Transports still open when the next dial started.
    pub leaked_at_dial: AtomicUsize,
}

impl Recorder {
    pub fn push(&self, entry: Trace) {
        self.trace.lock().unwrap().push(entry);
    }

    pub fn trace(&self) -> Vec<Trace> {
        self.trace.lock().unwrap().clone()
    }

    pub fn acks(&self) -> Vec<u64> {
        self.trace()
            .into_iter()
            .filter_map(|t| match t {
                Trace::Acked(lsn) => Some(lsn),
                _ => None,
            })
            .collect()
    }

    pub fn dispatched(&self) -> Vec<Trace> {
        self.trace()
            .into_iter()
            .filter(|t| matches!(t, Trace::Dispatched { .. }))
            .collect()
    }

    pub fn count(&self, entry: &Trace) -> usize {
        self.trace().iter().filter(|t| *t == entry).count()
    }

    pub fn dials(&self) -> usize {
        self.dial_times.lock().unwrap().len()
    }
}

/// Consumer that records every dispatch into the shared trace.
pub struct RecordingConsumer(pub Arc<Recorder>);

impl EventConsumer for RecordingConsumer {
    fn consume(&self, event: &ChangeEvent) {
        self.0.push(Trace::Dispatched {
            kind: event.kind(),
            schema: event.schema().to_string(),
            table: event.table().to_string(),
            payload: event.payload().map(str::to_string),
            lsn: event.position().as_u64(),
        });
    }
}

/// Connector that plays back one [`Attempt`] per dial; once the script is
/// exhausted every dial is refused.
pub struct ScriptedConnector {
    attempts: Mutex<VecDeque<Attempt>>,
    recorder: Arc<Recorder>,
}

impl ScriptedConnector {
    pub fn new(attempts: Vec<Attempt>, recorder: Arc<Recorder>) -> Self {
        Self {
            attempts: Mutex::new(attempts.into()),
            recorder,
        }
    }
}

#[tonic::async_trait]
impl Connector for ScriptedConnector {
    type Transport = ScriptedTransport;

    async fn dial(&self) -> Result<ScriptedTransport, ClientError> {
        let recorder = &self.recorder;
        recorder.dial_times.lock().unwrap().push(Instant::now());
        recorder.push(Trace::Dial);
        if recorder.transports_open.load(Ordering::SeqCst) > 0 {
            recorder.leaked_at_dial.fetch_add(1, Ordering::SeqCst);
        }

        let attempt = self
            .attempts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Attempt::RefuseDial);
        if matches!(attempt, Attempt::RefuseDial) {
            return Err(ClientError::Dial("connection refused".into()));
        }

        recorder.transports_open.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedTransport {
            attempt: Some(attempt),
            recorder: Arc::clone(recorder),
        })
    }
}

pub struct ScriptedTransport {
    attempt: Option<Attempt>,
    recorder: Arc<Recorder>,
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        self.recorder.transports_open.fetch_sub(1, Ordering::SeqCst);
        self.recorder.push(Trace::TransportClosed);
    }
}

#[tonic::async_trait]
impl Transport for ScriptedTransport {
    type Stream = ScriptedStream;

    async fn open_session(&mut self) -> Result<ScriptedStream, ClientError> {
        match self.attempt.take() {
            Some(Attempt::Serve { steps, acks }) => Ok(ScriptedStream {
                steps: steps.into(),
                acks,
                recorder: Arc::clone(&self.recorder),
            }),
            _ => Err(ClientError::SessionOpen("session rejected".into())),
        }
    }
}

pub struct ScriptedStream {
    steps: VecDeque<Step>,
    acks: AckMode,
    recorder: Arc<Recorder>,
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.recorder.push(Trace::StreamClosed);
    }
}

#[tonic::async_trait]
impl EventStream for ScriptedStream {
    async fn recv(&mut self) -> Result<ServerMessage, ClientError> {
        match self.steps.pop_front() {
            Some(Step::Message(message)) => {
                let lsn = ChangeEvent::from_message(message.clone()).map(|e| e.position().as_u64());
                self.recorder.push(Trace::Received(lsn));
                Ok(message)
            }
            Some(Step::Fail(reason)) => Err(ClientError::Stream(reason)),
            Some(Step::Stall) => std::future::pending().await,
            None => Err(ClientError::closed_by_remote()),
        }
    }

    async fn send(&mut self, ack: Ack) -> Result<(), ClientError> {
        match self.acks {
            AckMode::Deliver => {}
            AckMode::Fail => return Err(ClientError::Stream("broken pipe".into())),
            AckMode::Stall => std::future::pending::<()>().await,
        }
        self.recorder.push(Trace::Acked(ack.position.as_u64()));
        Ok(())
    }
}
