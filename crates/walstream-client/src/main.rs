//! walstream CDC client
//!
//! Connects to a walstream server, prints every change event and
//! acknowledges it, reconnecting forever until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use walstream_client::{
    ConnectionManager, ConsoleConsumer, GrpcConnector, ReconnectPolicy, SessionHandler,
};
use walstream_core::config::{Config, OutputFormat, ReconnectStrategy};
use walstream_core::tracing_init::{default_filter, init_tracing};

#[derive(Parser, Debug)]
#[command(name = "walstream-client")]
#[command(version, about = "Consume and acknowledge CDC events from a walstream server")]
struct Args {
    /// Config file (JSON). Defaults to ~/.config/walstream/client.json if present.
    #[arg(short, long, env = "WALSTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Server URL, e.g. "http://127.0.0.1:50051" (https:// enables TLS)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// PEM CA certificate for verifying the server's TLS certificate
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// Reconnect strategy: fixed or exponential
    #[arg(long)]
    reconnect: Option<ReconnectStrategy>,

    /// Reconnect delay in milliseconds (initial delay for exponential)
    #[arg(long)]
    reconnect_delay_ms: Option<u64>,

    /// Event output format: text or json
    #[arg(short, long)]
    output: Option<OutputFormat>,

    /// Log level filter (e.g. "info", "debug", "warn")
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation)
    #[arg(long)]
    log_json: bool,
}

impl Args {
    /// CLI flags have the highest priority.
    fn apply(self, config: &mut Config) {
        if let Some(url) = self.endpoint {
            config.endpoint.url = url;
        }
        if let Some(path) = self.ca_cert {
            config.endpoint.ca_cert_path = Some(path);
        }
        if let Some(strategy) = self.reconnect {
            config.reconnect.strategy = strategy;
        }
        if let Some(delay) = self.reconnect_delay_ms {
            config.reconnect.delay_ms = delay;
        }
        if let Some(format) = self.output {
            config.output.format = format;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if self.log_json {
            config.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = walstream_core::config::load_config(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    init_tracing(&default_filter(&config.logging.level), config.logging.json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %config.endpoint.url,
        reconnect = ?config.reconnect.strategy,
        output = %config.output.format,
        "Starting walstream-client"
    );

    let connector = GrpcConnector::new(&config.endpoint)?;
    let consumer = Arc::new(ConsoleConsumer::stdout(config.output.format));
    let manager = ConnectionManager::new(
        SessionHandler::new(connector, consumer),
        ReconnectPolicy::from(&config.reconnect),
    );

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    manager.run(cancel).await;

    info!("walstream-client stopped");
    Ok(())
}

/// Cancel on Ctrl+C or SIGTERM.
async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        () = sigterm => {
            info!("Received SIGTERM shutdown signal");
        }
    }
    cancel.cancel();
}
