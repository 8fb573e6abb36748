//! Application state management

use anyhow::Result;
use avr_core::{DeviceDescriptor, DeviceId};
use avr_discovery::{DetectedDevice, DiscoveryEvent, DiscoveryScanner};
use avr_state::{CommandGateway, DeviceCache, Reconciler, Registrar};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::bus::Bus;
use crate::config::Config;

/// Shared application state
pub struct AppState {
    /// Device directory and status store
    pub cache: DeviceCache,
    /// Registers detected receivers
    pub registrar: Arc<Registrar>,
    /// Poll-and-diff loop
    pub reconciler: Arc<Reconciler>,
    /// Power commands
    pub gateway: CommandGateway,
    /// Discovery scanner
    pub scanner: Arc<DiscoveryScanner>,
    /// Outbound change bus
    pub bus: Arc<Bus>,
    /// Configuration
    pub config: Config,
}

impl AppState {
    /// Create new application state
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let cache = DeviceCache::new(config.bus.capacity);
        let registrar = Arc::new(cache.registrar(config.query_timeout()));
        let reconciler = Arc::new(cache.reconciler(config.to_reconcile_config()));
        let gateway = cache.gateway(config.query_timeout());
        let scanner = Arc::new(DiscoveryScanner::new(config.to_scanner_config()));
        let bus = Arc::new(Bus::new(&config.bus));

        let state = Arc::new(Self {
            cache,
            registrar,
            reconciler,
            gateway,
            scanner,
            bus,
            config,
        });

        // Start forwarding scanner events
        let registrar = state.registrar.clone();
        let mut rx = state.scanner.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(DiscoveryEvent::Detected(device)) => {
                        let registrar = registrar.clone();
                        tokio::spawn(async move { register_detected(&registrar, device).await });
                    }
                    Ok(DiscoveryEvent::Error(message)) => {
                        warn!(error = %message, "Discovery error");
                    }
                    Ok(DiscoveryEvent::ScanStarted) => debug!("Discovery scan started"),
                    Ok(DiscoveryEvent::ScanCompleted { found, connected }) => {
                        debug!(found, connected, "Discovery scan completed");
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Discovery event channel lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(state)
    }

    /// Forget a device and its discovery connection
    pub async fn remove_device(&self, id: &DeviceId) -> Result<(), avr_state::StateError> {
        self.registrar.unregister(id).await?;
        self.scanner.forget(id.as_str()).await;
        info!(device = %id, "Device removed");
        Ok(())
    }
}

async fn register_detected(registrar: &Registrar, device: DetectedDevice) {
    let mut descriptor = DeviceDescriptor::new(DeviceId::from_identifier(&device.identity), device.name);
    descriptor.model = Some(device.model);
    descriptor.address = Some(device.address);

    // Failures are logged by the registrar; reconciliation retries
    let _ = registrar.register(descriptor, device.driver).await;
}
