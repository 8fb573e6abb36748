//! AVR Discovery - Network discovery for eISCP receivers
//!
//! Receivers answer a UDP broadcast query with their model, control port
//! and a stable identifier. The scanner connects to each newly announced
//! receiver and emits a `Detected` event carrying the live driver.

pub mod announce;
pub mod scanner;

pub use announce::Announcement;
pub use scanner::{DetectedDevice, DiscoveryEvent, DiscoveryScanner, ScannerConfig};
