//! Caller-facing error taxonomy.

use crate::port::PortError;
use thiserror::Error;

/// Errors reported by [`SerialController`](crate::controller::SerialController).
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The host has no serial capability at all.
    #[error("Serial ports are not available on this host")]
    TransportUnavailable,

    /// No port was authorized, or the user declined to pick one.
    #[error("No serial port found: {0}")]
    PortNotFound(String),

    /// The port was granted but could not be opened.
    #[error(
        "Failed to open serial port {port} (readable locked: {readable_locked}, writable locked: {writable_locked}): {source}"
    )]
    PortOpenFailed {
        port: String,
        readable_locked: bool,
        writable_locked: bool,
        #[source]
        source: PortError,
    },

    /// Another writer holds the write token.
    #[error("Writer is locked by another write")]
    WriterLocked,

    /// A read loop stopped on a transport error.
    #[error("Read failed: {0}")]
    Read(String),

    /// The device went away.
    #[error("Device disconnected: {0}")]
    Disconnected(String),

    /// Rejected connection parameters.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Port(#[from] PortError),
}

impl ControllerError {
    /// Whether the failure means the link itself is gone, as opposed to a
    /// rejected call on a healthy link.
    pub fn is_link_lost(&self) -> bool {
        matches!(self, Self::Read(_) | Self::Disconnected(_))
    }
}

/// Convenient Result type for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;
