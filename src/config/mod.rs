//! # Service Configuration
//!
//! Typed configuration for the store, the queues, the gRPC server, the
//! in-process channels and logging. [`ConfigLoader`] layers defaults, an
//! optional TOML file and `STATEMACHINE__*` environment variables.
//!
//! ```toml
//! release = "2024.06.1"
//!
//! [store]
//! endpoint = "redis://localhost:6379"
//! timeout_ms = 200
//! max_retries = 3
//!
//! [queues]
//! backend = "pgmq"
//! endpoint = "postgresql://localhost/statemachine"
//! events_queue = "fsm_events"
//! dlq = "fsm_events_dlq"
//!
//! [grpc]
//! bind_address = "0.0.0.0:7398"
//!
//! [grpc.tls]
//! enabled = true
//! directory = "/etc/statemachine/certs"
//! ```

pub mod error;
pub mod loader;

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Top-level service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub store: StoreConfig,
    pub queues: QueuesConfig,
    pub grpc: GrpcConfig,
    pub channels: ChannelsConfig,
    pub logging: LoggingConfig,
    /// Release tag reported by the `Health` RPC
    pub release: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            queues: QueuesConfig::default(),
            grpc: GrpcConfig::default(),
            channels: ChannelsConfig::default(),
            logging: LoggingConfig::default(),
            release: constants::RELEASE.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Check every section; the first violation is returned
    pub fn validate(&self) -> ConfigResult<()> {
        self.store.validate()?;
        self.queues.validate()?;
        self.grpc.validate()?;
        Ok(())
    }
}

/// Persistent store settings. An empty endpoint selects the in-memory store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub endpoint: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub transaction_attempts: u32,
    /// Zero keeps events forever
    pub event_ttl_seconds: u64,
    /// Zero keeps outcomes forever
    pub outcome_ttl_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout_ms: constants::DEFAULT_STORE_TIMEOUT.as_millis() as u64,
            max_retries: constants::DEFAULT_STORE_MAX_RETRIES,
            transaction_attempts: constants::DEFAULT_TRANSACTION_ATTEMPTS,
            event_ttl_seconds: 0,
            outcome_ttl_seconds: 0,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "store.timeout_ms",
                "0",
                "store timeout must be greater than zero",
            ));
        }
        if self.transaction_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "store.transaction_attempts",
                "0",
                "at least one transaction attempt is required",
            ));
        }
        Ok(())
    }

    pub fn is_in_memory(&self) -> bool {
        self.endpoint.trim().is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn event_ttl(&self) -> Duration {
        Duration::from_secs(self.event_ttl_seconds)
    }

    pub fn outcome_ttl(&self) -> Duration {
        Duration::from_secs(self.outcome_ttl_seconds)
    }
}

/// Queue implementation behind the ingress and dead-letter queues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    /// pgmq over Postgres at `queues.endpoint`
    #[default]
    Pgmq,
    /// Process-local queues; no external producer can reach them
    InMemory,
}

/// Ingress and dead-letter queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueuesConfig {
    pub backend: QueueBackend,
    /// pgmq Postgres URL
    pub endpoint: String,
    pub events_queue: String,
    /// Empty disables the error publisher
    pub dlq: String,
    pub poll_interval_ms: u64,
    pub visibility_timeout_seconds: u64,
    pub batch_size: usize,
    pub ack_retries: u32,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            endpoint: String::new(),
            events_queue: String::new(),
            dlq: String::new(),
            poll_interval_ms: 1000,
            visibility_timeout_seconds: 30,
            batch_size: 10,
            ack_retries: constants::DEFAULT_ACK_RETRIES,
        }
    }
}

impl QueuesConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.events_queue.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "events_queue",
                "queues",
            ));
        }
        if self.backend == QueueBackend::Pgmq && self.endpoint.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "endpoint",
                "queues (required by the pgmq backend)",
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "queues.batch_size",
                "0",
                "batch size must be at least 1",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "queues.poll_interval_ms",
                "0",
                "poll interval must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn dlq(&self) -> Option<&str> {
        let dlq = self.dlq.trim();
        (!dlq.is_empty()).then_some(dlq)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }
}

/// gRPC server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcConfig {
    pub bind_address: String,
    /// Register the standard `grpc.health.v1` service
    pub enable_health_service: bool,
    pub enable_reflection: bool,
    pub tls: TlsConfig,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7398".to_string(),
            enable_health_service: true,
            enable_reflection: false,
            tls: TlsConfig::default(),
        }
    }
}

impl GrpcConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.socket_addr()?;
        self.tls.validate()
    }

    pub fn socket_addr(&self) -> ConfigResult<SocketAddr> {
        self.bind_address
            .parse()
            .map_err(|e: std::net::AddrParseError| {
                ConfigurationError::invalid_value(
                    "grpc.bind_address",
                    &self.bind_address,
                    e.to_string(),
                )
            })
    }
}

/// Mutual TLS material. The directory holds `ca.pem`, `server.pem` and
/// `server-key.pem`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub directory: String,
}

impl TlsConfig {
    pub const CA_FILE: &'static str = "ca.pem";
    pub const CERT_FILE: &'static str = "server.pem";
    pub const KEY_FILE: &'static str = "server-key.pem";

    pub fn validate(&self) -> ConfigResult<()> {
        if self.enabled && self.directory.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "directory",
                "grpc.tls (required when TLS is enabled)",
            ));
        }
        Ok(())
    }

    pub fn path(&self, file: &str) -> PathBuf {
        PathBuf::from(&self.directory).join(file)
    }
}

/// In-process channel capacities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Zero makes the event channel unbounded
    pub events_buffer: usize,
    pub notifications_buffer: usize,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            events_buffer: 1024,
            notifications_buffer: 256,
        }
    }
}

/// Observability verbosity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    #[default]
    Normal,
    Verbose,
    /// Trace every request
    Trace,
}

impl Verbosity {
    /// Default `EnvFilter` directive for this level
    pub fn filter_directive(&self) -> &'static str {
        match self {
            Self::Normal => "info",
            Self::Verbose => "debug",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "normal",
            Self::Verbose => "verbose",
            Self::Trace => "trace",
        };
        f.write_str(name)
    }
}

impl FromStr for Verbosity {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" | "info" => Ok(Self::Normal),
            "verbose" | "debug" => Ok(Self::Verbose),
            "trace" => Ok(Self::Trace),
            other => Err(ConfigurationError::invalid_value(
                "logging.verbosity",
                other,
                "expected one of: normal, verbose, trace",
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub verbosity: Verbosity,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.queues.endpoint = "postgres://localhost/statemachine".to_string();
        config.queues.events_queue = "fsm_events".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert!(config.store.is_in_memory());
        assert_eq!(config.store.timeout(), Duration::from_millis(200));
        assert_eq!(config.store.max_retries, 3);
        assert_eq!(config.grpc.bind_address, "0.0.0.0:7398");
        assert_eq!(config.channels.events_buffer, 1024);
        assert_eq!(config.release, constants::RELEASE);
        assert!(config.queues.dlq().is_none());
        assert_eq!(config.queues.backend, QueueBackend::Pgmq);
    }

    #[test]
    fn test_pgmq_backend_requires_endpoint() {
        let mut config = valid();
        config.queues.endpoint = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingRequiredField { ref field, .. }) if field == "endpoint"
        ));

        config.queues.backend = QueueBackend::InMemory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_events_queue_required() {
        let err = ServiceConfig::default().validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::MissingRequiredField { ref field, .. } if field == "events_queue"
        ));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_tls_requires_directory() {
        let mut config = valid();
        config.grpc.tls.enabled = true;
        assert!(config.validate().is_err());

        config.grpc.tls.directory = "/etc/certs".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.grpc.tls.path(TlsConfig::CA_FILE),
            PathBuf::from("/etc/certs/ca.pem")
        );
    }

    #[test]
    fn test_invalid_bind_address() {
        let mut config = valid();
        config.grpc.bind_address = "localhost".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = valid();
        config.store.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_verbosity_parsing() {
        assert_eq!("trace".parse::<Verbosity>().unwrap(), Verbosity::Trace);
        assert_eq!("VERBOSE".parse::<Verbosity>().unwrap(), Verbosity::Verbose);
        assert!("loud".parse::<Verbosity>().is_err());
        assert!(Verbosity::Trace > Verbosity::Normal);
    }
}
