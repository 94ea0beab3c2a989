//! Transport seam between the session loop and the network.
//!
//! A connection attempt goes through three owned handles:
//! [`Connector::dial`] yields a [`Transport`], [`Transport::open_session`]
//! yields an [`EventStream`]. Dropping the handles releases the connection,
//! so a session that returns on any path leaves nothing open behind it.
//!
//! The gRPC implementation talks to `PluginService.Session`.

use std::net::IpAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Request;
use tonic::Streaming;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, info, warn};

use walstream_core::config::EndpointConfig;
use walstream_proto::plugin_service_client::PluginServiceClient;
use walstream_proto::{ClientMessage, ServerMessage};

use crate::error::{ClientError, error_chain};
use crate::event::Ack;

/// Acks are sent one at a time; a single slot is enough.
const OUTBOUND_BUFFER: usize = 1;

/// Establishes transport connections to the CDC server.
#[tonic::async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport;

    /// Connect to the server. Failures are [`ClientError::Dial`].
    async fn dial(&self) -> Result<Self::Transport, ClientError>;
}

/// An established connection able to start a streaming session.
#[tonic::async_trait]
pub trait Transport: Send {
    type Stream: EventStream;

    /// Open the bidirectional session. Failures are [`ClientError::SessionOpen`].
    async fn open_session(&mut self) -> Result<Self::Stream, ClientError>;
}

/// Duplex session: server messages in, acknowledgments out.
#[tonic::async_trait]
pub trait EventStream: Send {
    /// Next server message. End of stream is an error
    /// ([`ClientError::closed_by_remote`]).
    async fn recv(&mut self) -> Result<ServerMessage, ClientError>;

    /// Send one acknowledgment. Failures are [`ClientError::Stream`].
    async fn send(&mut self, ack: Ack) -> Result<(), ClientError>;
}

/// gRPC connector for a fixed endpoint.
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    endpoint: Endpoint,
}

impl GrpcConnector {
    /// Build the endpoint from configuration.
    ///
    /// `https://` URLs use TLS, verified against `ca_cert_path` when set and
    /// the system roots otherwise.
    pub fn new(config: &EndpointConfig) -> Result<Self, ClientError> {
        let keepalive = Duration::from_secs(config.keepalive_secs);
        let mut endpoint = Endpoint::from_shared(config.url.clone())
            .map_err(|e| ClientError::Config(format!("Invalid endpoint {}: {e}", config.url)))?
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .tcp_keepalive(Some(keepalive))
            .http2_keep_alive_interval(keepalive)
            .keep_alive_timeout(Duration::from_secs(10))
            .keep_alive_while_idle(true);

        if config.url.starts_with("https://") {
            let mut tls_config = ClientTlsConfig::new().with_enabled_roots();
            if let Some(ca_path) = &config.ca_cert_path {
                let ca_pem = std::fs::read_to_string(ca_path).map_err(|e| {
                    ClientError::Config(format!(
                        "Failed to read CA cert {}: {}",
                        ca_path.display(),
                        e
                    ))
                })?;
                tls_config = tls_config.ca_certificate(Certificate::from_pem(ca_pem));
                info!(ca_cert = %ca_path.display(), "TLS configured with custom CA cert");
            }
            endpoint = endpoint
                .tls_config(tls_config)
                .map_err(|e| ClientError::Config(e.to_string()))?;
        } else if !is_loopback(endpoint.uri().host()) {
            warn!(endpoint = %config.url, "Plaintext connection to a non-loopback host");
        }

        Ok(Self { endpoint })
    }

    pub fn uri(&self) -> String {
        self.endpoint.uri().to_string()
    }
}

#[tonic::async_trait]
impl Connector for GrpcConnector {
    type Transport = GrpcTransport;

    async fn dial(&self) -> Result<GrpcTransport, ClientError> {
        let channel = self.endpoint.connect().await.map_err(|e| {
            debug!(error = ?e, "connection error details");
            ClientError::Dial(format!("{e}: {}", error_chain(&e)))
        })?;
        Ok(GrpcTransport {
            client: PluginServiceClient::new(channel),
        })
    }
}

/// Connected `PluginService` client.
#[derive(Debug)]
pub struct GrpcTransport {
    client: PluginServiceClient<Channel>,
}

#[tonic::async_trait]
impl Transport for GrpcTransport {
    type Stream = GrpcEventStream;

    async fn open_session(&mut self) -> Result<GrpcEventStream, ClientError> {
        let (outbound, rx) = mpsc::channel::<ClientMessage>(OUTBOUND_BUFFER);
        let response = self
            .client
            .session(Request::new(ReceiverStream::new(rx)))
            .await
            .map_err(|status| ClientError::SessionOpen(status.to_string()))?;
        Ok(GrpcEventStream {
            inbound: response.into_inner(),
            outbound,
        })
    }
}

/// Active `PluginService.Session` stream.
#[derive(Debug)]
pub struct GrpcEventStream {
    inbound: Streaming<ServerMessage>,
    outbound: mpsc::Sender<ClientMessage>,
}

#[tonic::async_trait]
impl EventStream for GrpcEventStream {
    async fn recv(&mut self) -> Result<ServerMessage, ClientError> {
        match self.inbound.message().await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(ClientError::closed_by_remote()),
            Err(status) => Err(ClientError::Stream(status.to_string())),
        }
    }

    async fn send(&mut self, ack: Ack) -> Result<(), ClientError> {
        self.outbound
            .send(ack.into())
            .await
            .map_err(|_| ClientError::Stream("outbound channel closed".into()))
    }
}

fn is_loopback(host: Option<&str>) -> bool {
    match host {
        Some("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback()),
        None => false,
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn loopback_detection() {
        assert!(is_loopback(Some("127.0.0.1")));
        assert!(is_loopback(Some("localhost")));
        assert!(is_loopback(Some("[::1]")));
        assert!(!is_loopback(Some("10.1.2.3")));
        assert!(!is_loopback(Some("cdc.example.com")));
        assert!(!is_loopback(None));
    }

    #[test]
    fn connector_from_default_config() {
        let connector = GrpcConnector::new(&EndpointConfig::default()).unwrap();
        assert!(connector.uri().starts_with("http://127.0.0.1:50051"));
    }

    #[test]
    fn invalid_url_is_config_error() {
        let config = EndpointConfig {
            url: "not a url".into(),
            ..EndpointConfig::default()
        };
        assert!(matches!(
            GrpcConnector::new(&config),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn missing_ca_cert_is_config_error() {
        let config = EndpointConfig {
            url: "https://cdc.example.com:443".into(),
            ca_cert_path: Some("/nonexistent/ca.pem".into()),
            ..EndpointConfig::default()
        };
        let err = GrpcConnector::new(&config).unwrap_err();
        assert!(err.to_string().contains("Failed to read CA cert"));
    }

    #[tokio::test]
    async fn dial_refused_is_dial_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = GrpcConnector::new(&EndpointConfig {
            url: format!("http://127.0.0.1:{port}"),
            connect_timeout_secs: 1,
            ..EndpointConfig::default()
        })
        .unwrap();
        assert!(matches!(connector.dial().await, Err(ClientError::Dial(_))));
    }
}
