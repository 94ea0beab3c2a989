//! CDC client error types.

/// Errors that end a connection attempt.
///
/// Every variant is recoverable: the connection manager logs it and retries
/// after the reconnect delay.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport to the server could not be established.
    #[error("Dial error: {0}")]
    Dial(String),

    /// Transport is up but the streaming session could not start.
    #[error("Session open error: {0}")]
    SessionOpen(String),

    /// An active session failed on receive or send, or the server closed it.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Invalid client configuration (detected before any attempt).
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Orderly end-of-stream from the server, reported as a stream failure.
    pub fn closed_by_remote() -> Self {
        Self::Stream("stream closed by server".into())
    }
}

/// Walk the `source()` chain of an error and join into a single string.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = Vec::new();
    let mut current = err.source();
    while let Some(e) = current {
        chain.push(e.to_string());
        current = e.source();
    }
    if chain.is_empty() {
        String::from("(no further details)")
    } else {
        chain.join(" -> ")
    }
}
