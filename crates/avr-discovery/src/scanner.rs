//! Discovery scanner that broadcasts queries and connects to new receivers

use anyhow::Result;
use avr_core::DeviceDriver;
use avr_eiscp::transport::broadcast_collect;
use avr_eiscp::{codes, EiscpDevice, Message, EISCP_PORT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, RwLock};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::announce::Announcement;

/// Scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Discovery port receivers listen on
    pub port: u16,
    /// Seconds between discovery broadcasts
    pub interval_secs: u64,
    /// Broadcast addresses to query; empty means every interface's broadcast address
    pub broadcast: Vec<Ipv4Addr>,
    /// How long to collect replies after each broadcast
    pub response_window_ms: u64,
    /// Connect and request timeout for opened drivers
    pub request_timeout_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            port: EISCP_PORT,
            interval_secs: 30,
            broadcast: Vec::new(),
            response_window_ms: 1500,
            request_timeout_ms: avr_eiscp::DEFAULT_TIMEOUT_MS,
        }
    }
}

/// A newly connected receiver
#[derive(Clone)]
pub struct DetectedDevice {
    /// Stable identifier reported by the receiver
    pub identity: String,
    pub name: String,
    pub model: String,
    pub address: SocketAddr,
    pub driver: Arc<dyn DeviceDriver>,
}

impl std::fmt::Debug for DetectedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectedDevice")
            .field("identity", &self.identity)
            .field("name", &self.name)
            .field("model", &self.model)
            .field("address", &self.address)
            .finish()
    }
}

/// Discovery event for real-time updates
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// Receiver detected and connected
    Detected(DetectedDevice),
    /// Discovery failure (non-fatal)
    Error(String),
    /// Scan started
    ScanStarted,
    /// Scan completed
    ScanCompleted { found: usize, connected: usize },
}

/// Discovery scanner service
pub struct DiscoveryScanner {
    config: Arc<RwLock<ScannerConfig>>,
    connections: Arc<RwLock<HashMap<String, Arc<EiscpDevice>>>>,
    event_tx: broadcast::Sender<DiscoveryEvent>,
}

impl DiscoveryScanner {
    /// Create a new scanner with the given configuration
    pub fn new(config: ScannerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            config: Arc::new(RwLock::new(config)),
            connections: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Get current config
    pub async fn get_config(&self) -> ScannerConfig {
        self.config.read().await.clone()
    }

    /// Subscribe to discovery events
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.event_tx.subscribe()
    }

    /// Run a single discovery scan, returning every receiver that answered
    pub async fn scan_once(&self) -> Result<Vec<Announcement>> {
        let _ = self.event_tx.send(DiscoveryEvent::ScanStarted);

        let config = self.config.read().await.clone();
        let result = self.scan_with(&config).await;

        if let Err(e) = &result {
            warn!(error = %e, "Discovery scan failed");
            let _ = self.event_tx.send(DiscoveryEvent::Error(e.to_string()));
        }
        result
    }

    async fn scan_with(&self, config: &ScannerConfig) -> Result<Vec<Announcement>> {
        let targets = broadcast_targets(config);
        debug!(targets = ?targets, "Starting discovery scan");

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;

        let query = Message {
            unit: 'x',
            command: codes::DISCOVERY.to_string(),
            parameter: codes::QUERY.to_string(),
        };
        let replies = broadcast_collect(
            &socket,
            &targets,
            &query,
            Duration::from_millis(config.response_window_ms),
        )
        .await?;

        let mut announcements: Vec<Announcement> = Vec::new();
        for (from, message) in replies {
            match Announcement::parse(from.ip(), &message) {
                Some(a) if !announcements.iter().any(|b| b.identifier == a.identifier) => {
                    announcements.push(a)
                }
                Some(_) => {}
                None => debug!(from = %from, message = %message.to_iscp(), "Ignoring reply"),
            }
        }

        let request_timeout = Duration::from_millis(config.request_timeout_ms);
        let mut connected = 0;
        for announcement in &announcements {
            if self.connect(announcement, request_timeout).await {
                connected += 1;
            }
        }

        let _ = self.event_tx.send(DiscoveryEvent::ScanCompleted {
            found: announcements.len(),
            connected,
        });
        info!(
            "Scan complete: {} receivers answered, {} newly connected",
            announcements.len(),
            connected
        );

        Ok(announcements)
    }

    /// Connect to an announced receiver unless a live connection already exists
    async fn connect(&self, announcement: &Announcement, request_timeout: Duration) -> bool {
        {
            let connections = self.connections.read().await;
            if let Some(existing) = connections.get(&announcement.identifier) {
                if !existing.is_closed() {
                    debug!(identity = %announcement.identifier, "Receiver already connected");
                    return false;
                }
            }
        }

        let address = announcement.control_address();
        match EiscpDevice::connect(address, request_timeout).await {
            Ok(device) => {
                info!(
                    identity = %announcement.identifier,
                    model = %announcement.model,
                    address = %address,
                    "Detected receiver"
                );
                self.connections
                    .write()
                    .await
                    .insert(announcement.identifier.clone(), device.clone());

                let _ = self.event_tx.send(DiscoveryEvent::Detected(DetectedDevice {
                    identity: announcement.identifier.clone(),
                    name: announcement.model.clone(),
                    model: announcement.model.clone(),
                    address,
                    driver: device,
                }));
                true
            }
            Err(e) => {
                warn!(identity = %announcement.identifier, address = %address, error = %e, "Failed to connect to receiver");
                let _ = self.event_tx.send(DiscoveryEvent::Error(format!(
                    "failed to connect to {} at {}: {}",
                    announcement.identifier, address, e
                )));
                false
            }
        }
    }

    /// Drop the connection kept for `identity` so the next scan reconnects
    pub async fn forget(&self, identity: &str) -> bool {
        let removed = self.connections.write().await.remove(identity).is_some();
        if removed {
            debug!(identity = %identity, "Forgot receiver connection");
        }
        removed
    }

    /// Run continuous discovery in background
    pub async fn run(&self) -> Result<()> {
        let secs = self.config.read().await.interval_secs.max(1);
        let mut ticker = interval(Duration::from_secs(secs));

        info!(interval_secs = secs, "Discovery scheduler started");

        loop {
            ticker.tick().await;
            // Failures are reported through events; keep scanning
            let _ = self.scan_once().await;
        }
    }
}

/// Resolve where to send discovery broadcasts
fn broadcast_targets(config: &ScannerConfig) -> Vec<SocketAddr> {
    let mut addresses = config.broadcast.clone();

    if addresses.is_empty() {
        addresses = interface_broadcasts();
    }
    if addresses.is_empty() {
        addresses.push(Ipv4Addr::BROADCAST);
    }

    addresses
        .into_iter()
        .map(|ip| SocketAddr::new(IpAddr::V4(ip), config.port))
        .collect()
}

/// IPv4 broadcast addresses of every non-loopback interface
fn interface_broadcasts() -> Vec<Ipv4Addr> {
    use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};

    let mut addresses = Vec::new();
    for iface in NetworkInterface::show().unwrap_or_default() {
        for addr in &iface.addr {
            if let Addr::V4(v4) = addr {
                if v4.ip.is_loopback() {
                    continue;
                }
                if let Some(broadcast) = v4.broadcast {
                    if !addresses.contains(&broadcast) {
                        addresses.push(broadcast);
                    }
                }
            }
        }
    }
    addresses
}
