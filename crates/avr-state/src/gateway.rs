//! Command gateway: power control by device id

use avr_core::{DeviceId, DriverError, PowerState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::directory::Directory;
use crate::error::StateError;

pub struct CommandGateway {
    directory: Arc<Directory>,
    timeout: Duration,
}

impl CommandGateway {
    pub fn new(directory: Arc<Directory>, timeout: Duration) -> Self {
        Self { directory, timeout }
    }

    /// Switch a device's main zone on or off
    ///
    /// The new state reaches the status store through the device's own
    /// push notification, not through this call.
    pub async fn set_power_state(&self, id: &DeviceId, desired: PowerState) -> Result<(), StateError> {
        let device = self
            .directory
            .get(id)
            .await
            .ok_or_else(|| StateError::NotFound(id.clone()))?;

        let command = async {
            match desired {
                PowerState::On => device.driver.power_on().await,
                PowerState::Off => device.driver.power_off().await,
            }
        };
        let result = match tokio::time::timeout(self.timeout, command).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::Timeout {
                command: format!("power {}", desired),
                timeout: self.timeout,
            }),
        };

        match result {
            Ok(()) => {
                info!(device = %id, state = %desired, "Power state changed");
                Ok(())
            }
            Err(e) => {
                error!(device = %id, state = %desired, error = %e, "Power command failed");
                Err(StateError::Driver { id: id.clone(), source: e })
            }
        }
    }
}
