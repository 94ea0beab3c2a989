//! Configuration resolution for walstream.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Config file (explicit path, or ~/.config/walstream/client.json)
//! 3. Environment variables
//! 4. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default CDC server address (loopback, plaintext).
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:50051";

/// Complete walstream client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where and how to reach the CDC server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EndpointConfig {
    /// Server URL. `https://` enables TLS.
    pub url: String,
    /// PEM CA certificate used to verify the server (TLS only).
    pub ca_cert_path: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    /// TCP and HTTP/2 keepalive interval.
    pub keepalive_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENDPOINT.to_string(),
            ca_cert_path: None,
            connect_timeout_secs: 5,
            keepalive_secs: 10,
        }
    }
}

/// Reconnect strategy selector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectStrategy {
    /// Constant delay between attempts.
    #[default]
    Fixed,
    /// Capped exponential backoff with jitter.
    Exponential,
}

impl FromStr for ReconnectStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            other => Err(Error::Config(format!("Unknown reconnect strategy: {other}"))),
        }
    }
}

/// Retry timing between connection attempts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    pub strategy: ReconnectStrategy,
    /// Fixed delay, or the initial delay for exponential backoff.
    pub delay_ms: u64,
    /// Upper bound for exponential backoff.
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Maximum random jitter added to exponential delays.
    pub jitter_ms: u64,
}

impl ReconnectConfig {
    /// Reject timings that would make the retry loop spin without waiting.
    pub fn validate(&self) -> Result<()> {
        if self.delay_ms == 0 {
            return Err(Error::Config("reconnect.delay_ms must be greater than 0".into()));
        }
        if self.strategy == ReconnectStrategy::Exponential {
            if self.multiplier.is_nan() || self.multiplier < 1.0 {
                return Err(Error::Config(format!(
                    "reconnect.multiplier must be at least 1.0, got {}",
                    self.multiplier
                )));
            }
            if self.max_delay_ms < self.delay_ms {
                return Err(Error::Config(format!(
                    "reconnect.max_delay_ms ({}) is below reconnect.delay_ms ({})",
                    self.max_delay_ms, self.delay_ms
                )));
            }
        }
        Ok(())
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            strategy: ReconnectStrategy::Fixed,
            delay_ms: 2_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter_ms: 250,
        }
    }
}

/// Rendering of consumed events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `INSERT public.users: {...}`
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(Error::Config(format!("Unknown output format: {other}"))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Check cross-field constraints after all layers are applied.
    pub fn validate(&self) -> Result<()> {
        self.reconnect.validate()
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit `path` must exist; the global config file is optional.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => load_config_file(path)?,
        None => match global_config_path() {
            Some(global) if global.exists() => load_config_file(&global)?,
            _ => Config::default(),
        },
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    config.validate()?;

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("walstream").join("client.json"))
}

/// Read and parse a JSON config file.
pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Apply `WALSTREAM_*` overrides obtained through `lookup`.
///
/// Unparseable numeric values are ignored; unknown enum values are errors.
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("WALSTREAM_ENDPOINT") {
        config.endpoint.url = val;
    }
    if let Some(val) = lookup("WALSTREAM_CA_CERT") {
        config.endpoint.ca_cert_path = Some(PathBuf::from(val));
    }
    if let Some(n) = lookup("WALSTREAM_RECONNECT_DELAY_MS").and_then(|val| val.parse().ok()) {
        config.reconnect.delay_ms = n;
    }
    if let Some(val) = lookup("WALSTREAM_RECONNECT_STRATEGY") {
        config.reconnect.strategy = val.parse()?;
    }
    if let Some(val) = lookup("WALSTREAM_OUTPUT") {
        config.output.format = val.parse()?;
    }
    if let Some(val) = lookup("WALSTREAM_LOG_LEVEL") {
        config.logging.level = val;
    }
    Ok(())
}
