//! Errors surfaced by the state engine

use avr_core::{DeviceId, DriverError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Device not found: {0}")]
    NotFound(DeviceId),
    #[error("Device {id} failed: {source}")]
    Driver {
        id: DeviceId,
        #[source]
        source: DriverError,
    },
}

impl StateError {
    /// Numeric error code for callers; `None` when the failure carries no code
    pub fn code(&self) -> Option<u16> {
        match self {
            StateError::NotFound(_) => Some(404),
            StateError::Driver { source, .. } => source.code(),
        }
    }
}
