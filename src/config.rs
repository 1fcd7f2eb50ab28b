//! Client and pool configuration
//!
//! Both structures deserialize from JSON or YAML; missing fields fall back to
//! the library defaults. A zero timeout means "use the default".
//!
//! ```rust
//! use modbus_client::config::PoolConfig;
//!
//! let config = PoolConfig::from_yaml_str(
//!     "address: 192.168.1.100:502\nmax_connections: 4\n"
//! ).unwrap();
//! assert_eq!(config.max_connections, 4);
//! assert_eq!(config.timeout().as_millis(), 5000);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ModbusError, ModbusResult};
use crate::{DEFAULT_POOL_SIZE, DEFAULT_TCP_PORT, DEFAULT_TIMEOUT_MS};

fn default_address() -> String {
    format!("127.0.0.1:{}", DEFAULT_TCP_PORT)
}

fn effective_timeout(timeout_ms: u64) -> Duration {
    if timeout_ms == 0 {
        Duration::from_millis(DEFAULT_TIMEOUT_MS)
    } else {
        Duration::from_millis(timeout_ms)
    }
}

/// Configuration for a single session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote `host:port`
    pub address: String,
    /// Connect, read and write timeout in milliseconds
    pub timeout_ms: u64,
    /// Dump every sent and received frame as hex at debug level
    pub packet_logging: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            packet_logging: false,
        }
    }
}

impl ClientConfig {
    /// Configuration for `address` with default timeout
    pub fn new<S: Into<String>>(address: S) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Override the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Enable or disable packet logging
    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    /// Timeout applied to every connect, read and write
    pub fn timeout(&self) -> Duration {
        effective_timeout(self.timeout_ms)
    }

    pub fn from_json_str(text: &str) -> ModbusResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_yaml_str(text: &str) -> ModbusResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ModbusResult<Self> {
        load_file(path.as_ref())
    }
}

/// Configuration for a connection pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Remote `host:port`
    pub address: String,
    /// Session timeout in milliseconds, also the default acquire timeout
    pub timeout_ms: u64,
    /// Number of sessions opened at construction; zero selects the default
    pub max_connections: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_connections: DEFAULT_POOL_SIZE,
        }
    }
}

impl PoolConfig {
    pub fn new<S: Into<String>>(address: S, max_connections: usize, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout_ms: timeout.as_millis() as u64,
            max_connections,
        }
    }

    pub fn timeout(&self) -> Duration {
        effective_timeout(self.timeout_ms)
    }

    /// Pool capacity after applying the default for zero
    pub fn capacity(&self) -> usize {
        if self.max_connections == 0 {
            DEFAULT_POOL_SIZE
        } else {
            self.max_connections
        }
    }

    /// Per-session configuration derived from this pool configuration
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.address.clone()).with_timeout(self.timeout())
    }

    pub fn from_json_str(text: &str) -> ModbusResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_yaml_str(text: &str) -> ModbusResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ModbusResult<Self> {
        load_file(path.as_ref())
    }
}

/// Read and deserialize a configuration file, choosing the format by extension
pub(crate) fn load_file<T: DeserializeOwned>(path: &Path) -> ModbusResult<T> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        ModbusError::configuration(format!("Failed to read {}: {}", path.display(), e))
    })?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(serde_json::from_str(&text)?),
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&text)?),
        _ => Err(ModbusError::configuration(format!(
            "Unsupported configuration format: {}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_defaults() {
        let config = ClientConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.address, "127.0.0.1:502");
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let config = ClientConfig::from_json_str(r#"{"address": "10.0.0.5:1502", "timeout_ms": 0}"#).unwrap();
        assert_eq!(config.address, "10.0.0.5:1502");
        assert_eq!(config.timeout(), Duration::from_millis(DEFAULT_TIMEOUT_MS));
    }

    #[test]
    fn test_pool_yaml() {
        let config = PoolConfig::from_yaml_str("address: plc.local:502\ntimeout_ms: 250\nmax_connections: 0\n").unwrap();
        assert_eq!(config.capacity(), DEFAULT_POOL_SIZE);
        assert_eq!(config.timeout(), Duration::from_millis(250));

        let client = config.client_config();
        assert_eq!(client.address, "plc.local:502");
        assert_eq!(client.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_config() {
        let err = PoolConfig::from_json_str(r#"{"max_connections": "many"}"#).unwrap_err();
        assert!(matches!(err, ModbusError::Configuration { .. }));

        let err = ClientConfig::from_file("modbus.toml").unwrap_err();
        assert!(matches!(err, ModbusError::Configuration { .. }));
    }

    #[test]
    fn test_load_file() {
        let path = std::env::temp_dir().join(format!("modbus-client-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"address": "192.168.1.100:502", "max_connections": 3}"#).unwrap();

        let config = PoolConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.address, "192.168.1.100:502");
        assert_eq!(config.capacity(), 3);
    }
}
