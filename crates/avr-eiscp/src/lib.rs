//! AVR eISCP - Onkyo/Integra receiver control over TCP
//!
//! This crate implements the eISCP framing used by networked Onkyo and
//! Integra receivers and exposes a connected receiver as a `DeviceDriver`.

pub mod codes;
pub mod device;
pub mod packet;
pub mod transport;

pub use device::EiscpDevice;
pub use packet::{Message, PacketError};

/// eISCP control and discovery port
pub const EISCP_PORT: u16 = 60128;

/// Default timeout for a single query
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
