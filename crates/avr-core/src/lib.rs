//! AVR Core - Core types for the AVR Sentinel device cache
//!
//! This crate provides the foundational types shared by every other crate:
//! - Device descriptors and the identifier space for discovered receivers
//! - Complete status snapshots and sparse status updates
//! - The `DeviceDriver` capability used to query and control a live receiver
//! - Driver error types with numeric error codes

pub mod device;
pub mod driver;
pub mod error;
pub mod status;

pub use device::{Device, DeviceDescriptor, DeviceId, DriverHandle, AVR_DEVICE_TYPE};
pub use driver::{DeviceDriver, DriverEvent, PowerState};
pub use error::DriverError;
pub use status::{Status, StatusUpdate};
