//! Shared tracing/logging initialization.
//!
//! Logs always go to stderr: stdout belongs to the event consumer.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build the default `RUST_LOG`-style directive for the given level,
/// scoped to the walstream crates.
pub fn default_filter(level: &str) -> String {
    format!("walstream_client={level},walstream_core={level}")
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (e.g. `"walstream_client=info"`).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
