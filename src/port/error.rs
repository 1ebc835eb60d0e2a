//! Port-specific error types.
//!
//! Transport failures are kept separate from the controller-level taxonomy so a
//! transport implementation never has to know about connection lifecycle rules.

use thiserror::Error;

/// Errors that can occur during serial transport operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial port was not found on the system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// An I/O error occurred while reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Port configuration was rejected by the transport.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Attempted to open a port that's already open.
    #[error("Port is already open")]
    AlreadyOpen,

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Wrap an arbitrary message as an I/O error of kind `Other`.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Io(std::io::Error::other(message.into()))
    }
}
