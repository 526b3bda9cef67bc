//! Client configuration.
//!
//! Every field has a default, so an empty JSON object is a complete
//! configuration. The configuration is immutable once loaded and shared as an
//! `Arc<RpcConfig>` by everything built from it.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use trible_common::transport::Serializer;
use trible_common::{Result, TribleError};

/// Well-known strategy keys.
pub mod keys {
    pub const LOCAL: &str = "LOCAL";
    pub const ZOOKEEPER: &str = "ZOOKEEPER";
    pub const ETCD: &str = "ETCD";

    pub const RANDOM: &str = "RANDOM";
    pub const ROUND_ROBIN: &str = "ROUND_ROBIN";
    pub const CONSISTENT_HASH: &str = "CONSISTENT_HASH";

    pub const NO_RETRY: &str = "NO_RETRY";
    pub const FIXED_COUNT: &str = "FIXED_COUNT";
    pub const FIXED_INTERVAL: &str = "FIXED_INTERVAL";
    pub const EXPONENTIAL_BACKOFF: &str = "EXPONENTIAL_BACKOFF";

    pub const FAIL_FAST: &str = "FAIL_FAST";
    pub const SILENT: &str = "SILENT";
    pub const FAIL_OVER: &str = "FAIL_OVER";
    pub const FAIL_BACK: &str = "FAIL_BACK";
}

/// Top-level client configuration.
///
/// # Example
///
/// ```
/// use trible_client::RpcConfig;
///
/// let config = RpcConfig::from_json_str(r#"{"balancer": "ROUND_ROBIN", "retry": {"type": "FIXED_COUNT"}}"#).unwrap();
/// assert_eq!(config.balancer, "ROUND_ROBIN");
/// assert_eq!(config.retry.max_attempts, 3);
/// assert_eq!(config.port, 1205);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RpcConfig {
    pub name: String,
    pub version: String,
    pub host: String,
    pub port: u16,
    /// Body serializer key
    pub serialization: String,
    /// Per-attempt deadline for one request/response exchange
    pub timeout_ms: u64,
    pub registry: RegistryConfig,
    /// Load balancer key
    pub balancer: String,
    pub retry: RetryConfig,
    pub tolerant: TolerantConfig,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            name: "trible-rpc".to_string(),
            version: "1.0.0".to_string(),
            host: "localhost".to_string(),
            port: 1205,
            serialization: "JSON".to_string(),
            timeout_ms: 5000,
            registry: RegistryConfig::default(),
            balancer: keys::RANDOM.to_string(),
            retry: RetryConfig::default(),
            tolerant: TolerantConfig::default(),
        }
    }
}

/// Service discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Discovery key
    #[serde(rename = "type")]
    pub kind: String,
    /// Backend address. For `LOCAL` this is a comma-separated list of
    /// `service@host:port` entries used to seed the in-process registry.
    /// For `ZOOKEEPER` and `ETCD` it is the root path services are listed
    /// under, `/rpc` when empty.
    pub address: String,
    /// Deadline for a single discovery lookup
    pub timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            kind: keys::LOCAL.to_string(),
            address: String::new(),
            timeout_ms: 3000,
        }
    }
}

/// Retry policy settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Retry key
    #[serde(rename = "type")]
    pub kind: String,
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Fixed delay, or the initial delay for exponential backoff
    pub interval_ms: u64,
    /// Exponential backoff cap
    pub max_interval_ms: u64,
    /// Multiply backoff delays by a random factor in [0.5, 1.5)
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            kind: keys::NO_RETRY.to_string(),
            max_attempts: 3,
            interval_ms: 1000,
            max_interval_ms: 10_000,
            jitter: true,
        }
    }
}

/// Fault tolerance settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TolerantConfig {
    /// Tolerant strategy key
    #[serde(rename = "type")]
    pub kind: String,
    /// Upper bound on reselections made by `FAIL_OVER`
    pub max_failover: usize,
    /// Value returned by `FAIL_BACK`
    pub fallback: Option<serde_json::Value>,
}

impl Default for TolerantConfig {
    fn default() -> Self {
        Self {
            kind: keys::SILENT.to_string(),
            max_failover: 2,
            fallback: None,
        }
    }
}

impl RpcConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| TribleError::InvalidConfig(format!("malformed configuration: {e}")))
    }

    /// Reads and parses a JSON configuration file, then validates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TribleError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_balancer(mut self, key: impl Into<String>) -> Self {
        self.balancer = key.into();
        self
    }

    pub fn with_retry(mut self, key: impl Into<String>, max_attempts: u32) -> Self {
        self.retry.kind = key.into();
        self.retry.max_attempts = max_attempts;
        self
    }

    pub fn with_tolerant(mut self, key: impl Into<String>) -> Self {
        self.tolerant.kind = key.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_registry(mut self, key: impl Into<String>) -> Self {
        self.registry.kind = key.into();
        self
    }

    pub fn with_registry_address(mut self, address: impl Into<String>) -> Self {
        self.registry.address = address.into();
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if:
    /// - `retry.max_attempts` is zero
    /// - `timeout_ms` or `registry.timeout_ms` is zero
    /// - `retry.max_interval_ms` is below `retry.interval_ms`
    /// - `serialization` names no known serializer
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(TribleError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.timeout_ms == 0 {
            return Err(TribleError::InvalidConfig(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.registry.timeout_ms == 0 {
            return Err(TribleError::InvalidConfig(
                "registry.timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.retry.max_interval_ms < self.retry.interval_ms {
            return Err(TribleError::InvalidConfig(format!(
                "retry.max_interval_ms ({}) must be >= retry.interval_ms ({})",
                self.retry.max_interval_ms, self.retry.interval_ms
            )));
        }

        self.serializer()?;
        Ok(())
    }

    /// The configured body serializer.
    pub fn serializer(&self) -> Result<Serializer> {
        Serializer::from_key(&self.serialization).ok_or_else(|| TribleError::Configuration {
            capability: "serializer".to_string(),
            key: self.serialization.clone(),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_millis(self.registry.timeout_ms)
    }
}
