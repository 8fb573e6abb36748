//! Configuration loading and validation

use anyhow::Result;
use avr_discovery::ScannerConfig;
use avr_state::ReconcileConfig;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub reconcile: ReconcileSection,
    #[serde(default)]
    pub bus: BusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for web server
    #[serde(default = "default_bind")]
    pub bind: String,
    /// TLS configuration (optional - enables HTTPS when present)
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            tls: None,
        }
    }
}

/// TLS/HTTPS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM format)
    pub cert: String,
    /// Path to private key file (PEM format)
    pub key: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// eISCP discovery port
    #[serde(default = "default_discovery_port")]
    pub port: u16,
    /// Seconds between discovery broadcasts
    #[serde(default = "default_discovery_interval")]
    pub interval_secs: u64,
    /// Broadcast addresses; empty means every interface
    #[serde(default)]
    pub broadcast: Vec<Ipv4Addr>,
    /// How long to collect replies per broadcast
    #[serde(default = "default_response_window")]
    pub response_window_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: default_discovery_port(),
            interval_secs: default_discovery_interval(),
            broadcast: Vec::new(),
            response_window_ms: default_response_window(),
        }
    }
}

fn default_discovery_port() -> u16 {
    avr_eiscp::EISCP_PORT
}

fn default_discovery_interval() -> u64 {
    30
}

fn default_response_window() -> u64 {
    1500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileSection {
    /// Run the poll-and-diff loop
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Delay after a successful pass
    #[serde(default = "default_reconcile_interval")]
    pub interval_ms: u64,
    /// Delay after a pass in which every device failed
    #[serde(default = "default_backoff")]
    pub backoff_secs: u64,
    /// Bound on each single device query or command
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,
}

impl Default for ReconcileSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_reconcile_interval(),
            backoff_secs: default_backoff(),
            query_timeout_ms: default_query_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_reconcile_interval() -> u64 {
    1000
}

fn default_backoff() -> u64 {
    60
}

fn default_query_timeout() -> u64 {
    avr_eiscp::DEFAULT_TIMEOUT_MS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Module name stamped on every bus message
    #[serde(default = "default_module")]
    pub module: String,
    /// Topic prefix, e.g. `sentinel` gives `sentinel.device.update`
    #[serde(default = "default_prefix")]
    pub topic_prefix: String,
    /// Change stream buffer size
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            module: default_module(),
            topic_prefix: default_prefix(),
            capacity: default_capacity(),
        }
    }
}

fn default_module() -> String {
    "onkyo".to_string()
}

fn default_prefix() -> String {
    "sentinel".to_string()
}

fn default_capacity() -> usize {
    256
}

impl Config {
    /// Convert to ScannerConfig
    pub fn to_scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            port: self.discovery.port,
            interval_secs: self.discovery.interval_secs,
            broadcast: self.discovery.broadcast.clone(),
            response_window_ms: self.discovery.response_window_ms,
            request_timeout_ms: self.reconcile.query_timeout_ms,
        }
    }

    /// Convert to ReconcileConfig
    pub fn to_reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            interval: Duration::from_millis(self.reconcile.interval_ms),
            backoff: Duration::from_secs(self.reconcile.backoff_secs),
            query_timeout: self.query_timeout(),
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.reconcile.query_timeout_ms)
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.daemon.bind, "0.0.0.0:8080");
        assert_eq!(config.discovery.port, 60128);
        assert!(config.reconcile.enabled);
        assert_eq!(config.to_reconcile_config().interval, Duration::from_secs(1));
        assert_eq!(config.to_reconcile_config().backoff, Duration::from_secs(60));
        assert_eq!(config.query_timeout(), Duration::from_secs(5));
        assert_eq!(config.bus.topic_prefix, "sentinel");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[discovery]
broadcast = ["192.168.1.255"]

[reconcile]
enabled = false

[bus]
module = "avr"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.discovery.broadcast, vec![Ipv4Addr::new(192, 168, 1, 255)]);
        assert_eq!(config.discovery.interval_secs, 30);
        assert!(!config.reconcile.enabled);
        assert_eq!(config.bus.module, "avr");
        assert_eq!(config.bus.capacity, 256);
        assert!(config.daemon.tls.is_none());

        let scanner = config.to_scanner_config();
        assert_eq!(scanner.broadcast, vec![Ipv4Addr::new(192, 168, 1, 255)]);
        assert_eq!(scanner.request_timeout_ms, 5000);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[discovery]\nport = \"not a port\"").unwrap();
        assert!(load_config(file.path()).is_err());
    }
}
