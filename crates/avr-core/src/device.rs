//! Device types for tracking discovered receivers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::driver::DeviceDriver;

/// Classification tag carried by every receiver in the directory
pub const AVR_DEVICE_TYPE: &str = "multimedia.avr";

/// Unique identifier for a device, as reported by its driver
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Create a DeviceId from the driver-reported stable identifier
    pub fn from_identifier(identifier: &str) -> Self {
        Self(identifier.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Static identity of a device, as published to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// Stable identifier reported by the driver
    pub id: DeviceId,
    /// Human-readable name
    pub name: String,
    /// Classification tag
    #[serde(rename = "type")]
    pub kind: String,
    /// Receiver model, if discovery reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Control connection address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<SocketAddr>,
    /// When the detection that produced this entry happened
    pub discovered_at: DateTime<Utc>,
}

impl DeviceDescriptor {
    /// Create a receiver descriptor with the fixed classification tag
    pub fn new(id: DeviceId, name: String) -> Self {
        Self {
            id,
            name,
            kind: AVR_DEVICE_TYPE.to_string(),
            model: None,
            address: None,
            discovered_at: Utc::now(),
        }
    }
}

/// Shared handle to a live device driver
#[derive(Clone)]
pub struct DriverHandle(Arc<dyn DeviceDriver>);

impl DriverHandle {
    pub fn new(driver: Arc<dyn DeviceDriver>) -> Self {
        Self(driver)
    }

    /// True when both handles control the same driver instance
    pub fn same_driver(&self, other: &DriverHandle) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl std::ops::Deref for DriverHandle {
    type Target = dyn DeviceDriver;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DriverHandle").finish()
    }
}

/// A directory entry: descriptor plus the handle that controls the device
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    #[serde(flatten)]
    pub descriptor: DeviceDescriptor,
    #[serde(skip)]
    pub driver: DriverHandle,
}

impl Device {
    pub fn new(descriptor: DeviceDescriptor, driver: Arc<dyn DeviceDriver>) -> Self {
        Self {
            descriptor,
            driver: DriverHandle::new(driver),
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.descriptor.id
    }
}
