//! Driver-level errors

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("Connection to device lost")]
    Disconnected,
    #[error("IO error: {0}")]
    Io(String),
    #[error("Query '{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("Device reports '{0}' as not available")]
    Unavailable(String),
    #[error("Invalid response to '{command}': {value}")]
    InvalidResponse { command: String, value: String },
    #[error("Device rejected request ({code}): {message}")]
    Rejected { code: u16, message: String },
}

impl DriverError {
    /// Numeric error code surfaced to callers, if the failure carries one
    pub fn code(&self) -> Option<u16> {
        match self {
            DriverError::Timeout { .. } => Some(504),
            DriverError::Unavailable(_) => Some(503),
            DriverError::Rejected { code, .. } => Some(*code),
            DriverError::Disconnected | DriverError::Io(_) | DriverError::InvalidResponse { .. } => {
                None
            }
        }
    }
}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        DriverError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(DriverError::Unavailable("PWR".into()).code(), Some(503));
        assert_eq!(
            DriverError::Rejected { code: 404, message: "gone".into() }.code(),
            Some(404)
        );
        assert_eq!(DriverError::Disconnected.code(), None);
    }
}
