//! Device authorization boundary.
//!
//! A controller never enumerates ports itself. It asks a [`PortAuthorizer`]
//! for ports the user already granted and, failing that, for a fresh grant.
//! Which port a fresh grant picks is decided by a [`PortSelector`].

use crate::port::{PortInfo, SerialTransport};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub mod selector;
pub mod system;

pub use selector::{PortSelector, WhitelistSelector, DEFAULT_NAME_WHITELIST};
pub use system::{enumerate_ports, SystemPortAuthorizer};

/// Errors raised at the authorization boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// Nothing to choose from.
    #[error("No serial devices found")]
    NoDevices,

    /// The request was refused or dismissed.
    #[error("Port request denied: {0}")]
    Denied(String),

    /// The host port list could not be read.
    #[error("Port enumeration failed: {0}")]
    Enumeration(String),
}

/// A port offered for selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortCandidate {
    /// System port name, used to open it.
    pub port_id: String,
    /// Human readable device name (USB product string when known).
    pub display_name: String,
    /// Stable hardware id, `USB\VID_xxxx&PID_xxxx\<serial>` for USB devices.
    pub instance_id: Option<String>,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub manufacturer: Option<String>,
}

impl PortCandidate {
    pub fn info(&self) -> PortInfo {
        PortInfo {
            name: self.port_id.clone(),
            vendor_id: self.vendor_id,
            product_id: self.product_id,
        }
    }
}

impl From<serialport::SerialPortInfo> for PortCandidate {
    fn from(port: serialport::SerialPortInfo) -> Self {
        match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                let display_name = usb
                    .product
                    .as_deref()
                    .map(|p| p.replace('_', " "))
                    .unwrap_or_else(|| port.port_name.clone());
                let instance_id = format!(
                    "USB\\VID_{:04X}&PID_{:04X}\\{}",
                    usb.vid,
                    usb.pid,
                    usb.serial_number.as_deref().unwrap_or_default()
                );
                Self {
                    port_id: port.port_name,
                    display_name,
                    instance_id: Some(instance_id),
                    vendor_id: Some(usb.vid),
                    product_id: Some(usb.pid),
                    manufacturer: usb.manufacturer,
                }
            }
            _ => Self {
                display_name: port.port_name.clone(),
                port_id: port.port_name,
                ..Default::default()
            },
        }
    }
}

/// Host capability to grant access to serial devices.
#[async_trait]
pub trait PortAuthorizer: Send + Sync {
    /// Whether this host can talk to serial devices at all.
    async fn is_available(&self) -> bool;

    /// Ports granted earlier, most relevant first. Never prompts.
    async fn authorized_ports(&self) -> Result<Vec<Box<dyn SerialTransport>>, AuthorizationError>;

    /// Ask for a new grant. Implementations may pick a port by policy.
    async fn request_port(&self) -> Result<Box<dyn SerialTransport>, AuthorizationError>;
}
