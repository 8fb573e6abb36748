//! The capability used to query and control one live receiver

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::DriverError;

/// Field-change notification pushed by a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    Power(bool),
    SoundMode(String),
    Mute(bool),
    Volume(u32),
    Source(String),
}

impl DriverEvent {
    /// Name of the status field this event carries
    pub fn field(&self) -> &'static str {
        match self {
            DriverEvent::Power(_) => "on",
            DriverEvent::SoundMode(_) => "soundMode",
            DriverEvent::Mute(_) => "mute",
            DriverEvent::Volume(_) => "volume",
            DriverEvent::Source(_) => "source",
        }
    }
}

/// Desired main zone power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl std::str::FromStr for PowerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(PowerState::On),
            "off" => Ok(PowerState::Off),
            other => Err(format!("invalid power state '{}', expected 'on' or 'off'", other)),
        }
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
        }
    }
}

/// Driver trait - every receiver protocol implements this
///
/// All methods take `&self` so a driver can be shared behind `Arc<dyn DeviceDriver>`.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Query main zone power
    async fn is_on(&self) -> Result<bool, DriverError>;

    /// Query master volume
    async fn volume(&self) -> Result<u32, DriverError>;

    /// Query audio muting
    async fn mute(&self) -> Result<bool, DriverError>;

    /// Query selected input source
    async fn source(&self) -> Result<String, DriverError>;

    /// Query listening mode
    async fn sound_mode(&self) -> Result<String, DriverError>;

    async fn power_on(&self) -> Result<(), DriverError>;

    async fn power_off(&self) -> Result<(), DriverError>;

    /// Subscribe to pushed field changes
    ///
    /// The stream closes when the driver loses its connection to the device.
    fn subscribe(&self) -> broadcast::Receiver<DriverEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_state_parse() {
        assert_eq!("on".parse::<PowerState>(), Ok(PowerState::On));
        assert_eq!("off".parse::<PowerState>(), Ok(PowerState::Off));
        assert!("standby".parse::<PowerState>().is_err());
        assert_eq!(PowerState::Off.to_string(), "off");
    }
}
