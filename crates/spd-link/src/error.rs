//! Error types for the instrument link

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur on the instrument link
#[derive(Debug, Error)]
pub enum LinkError {
    /// Could not open the device
    #[error("failed to open {path}: {source}")]
    Open {
        /// Device path that failed to open
        path: String,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// The device exists but the process may not touch it
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Serial port error
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error on an open link
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No reply arrived within the request/response bound
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The link's I/O worker has shut down
    #[error("instrument link closed")]
    Closed,
}

impl LinkError {
    /// Whether this error is a reply timeout rather than a link failure
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::Timeout(_))
    }
}

/// Errors that can occur during device discovery
#[derive(Debug, Error)]
pub enum DetectError {
    /// Port enumeration failed
    #[error("failed to enumerate serial ports: {0}")]
    EnumerationFailed(String),

    /// No serial port or USBTMC device was found
    #[error("no instrument found")]
    NoDevice,
}
