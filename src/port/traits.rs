//! Core traits for serial transport abstraction.
//!
//! Defines the `SerialTransport` trait that allows both real serial ports and
//! mock devices to sit behind the controller, plus the configuration types a
//! transport is opened with.

use super::error::PortError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

/// Default baud rate for microcontroller links.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default size of the read buffer handed to the transport.
pub const DEFAULT_BUFFER_SIZE: usize = 255;

/// Upper bound (exclusive) for the read buffer size.
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Configuration parameters for a serial port.
///
/// The electrical parameters are passed straight through to the transport;
/// nothing in this crate interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits (7 or 8).
    pub data_bits: DataBits,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Parity checking mode.
    pub parity: Parity,

    /// Flow control mode.
    pub flow_control: FlowControl,

    /// Size of the buffer used for each read call.
    pub buffer_size: usize,

    /// Low-level transport timeout.
    pub timeout: Duration,
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            timeout: Duration::from_secs(1),
        }
    }
}

impl PortConfiguration {
    /// Check the values a transport cannot meaningfully open with.
    pub fn validate(&self) -> Result<(), PortError> {
        if self.baud_rate == 0 {
            return Err(PortError::config("baud rate must be a positive integer"));
        }
        if self.buffer_size == 0 || self.buffer_size >= MAX_BUFFER_SIZE {
            return Err(PortError::config(format!(
                "buffer size must be between 1 and {} bytes, got {}",
                MAX_BUFFER_SIZE - 1,
                self.buffer_size
            )));
        }
        Ok(())
    }
}

/// Caller-supplied overrides merged over the configured defaults at connect time.
///
/// Every field is optional; anything left unset keeps the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOverrides {
    pub baud_rate: Option<u32>,
    pub data_bits: Option<DataBits>,
    pub stop_bits: Option<StopBits>,
    pub parity: Option<Parity>,
    pub flow_control: Option<FlowControl>,
    pub buffer_size: Option<usize>,
}

impl ConnectionOverrides {
    /// Override only the baud rate.
    pub fn with_baud_rate(baud_rate: u32) -> Self {
        Self {
            baud_rate: Some(baud_rate),
            ..Default::default()
        }
    }

    /// Produce the effective configuration. The result is validated, so an
    /// override of zero baud is rejected here rather than at the transport.
    pub fn merge_over(&self, defaults: &PortConfiguration) -> Result<PortConfiguration, PortError> {
        let merged = PortConfiguration {
            baud_rate: self.baud_rate.unwrap_or(defaults.baud_rate),
            data_bits: self.data_bits.unwrap_or(defaults.data_bits),
            stop_bits: self.stop_bits.unwrap_or(defaults.stop_bits),
            parity: self.parity.unwrap_or(defaults.parity),
            flow_control: self.flow_control.unwrap_or(defaults.flow_control),
            buffer_size: self.buffer_size.unwrap_or(defaults.buffer_size),
            timeout: defaults.timeout,
        };
        merged.validate()?;
        Ok(merged)
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Seven,
    Eight,
}

impl TryFrom<u8> for DataBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(format!("data bits must be 7 or 8, got {other}")),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    One,
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(format!("stop bits must be 1 or 2, got {other}")),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
        }
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    Hardware,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// Identity of the device behind a transport, reported back to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    /// System name of the port (e.g. `/dev/ttyACM0` or `COM3`).
    pub name: String,
    /// USB vendor id, when the port is a USB device.
    pub vendor_id: Option<u16>,
    /// USB product id, when the port is a USB device.
    pub product_id: Option<u16>,
}

/// Whether the readable and writable sides of a port are currently claimed.
/// Carried in open-failure diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockState {
    pub readable_locked: bool,
    pub writable_locked: bool,
}

/// Read half of an opened port.
pub type PortReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of an opened port.
pub type PortWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The streams handed out by a successful `open`.
pub struct OpenedPort {
    pub reader: PortReader,
    pub writer: PortWriter,
    /// Resolves with a reason when the device disappears. Dropped without a
    /// value when the port is closed normally.
    pub disconnected: Option<oneshot::Receiver<String>>,
}

impl std::fmt::Debug for OpenedPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedPort")
            .field("watches_disconnect", &self.disconnected.is_some())
            .finish()
    }
}

/// Trait for an openable serial port.
///
/// Opening hands back independent read and write halves; the controller wraps
/// each half in its own exclusive lock. Closing a transport ends the read
/// stream and silences its disconnect signal.
#[async_trait]
pub trait SerialTransport: Send + Sync + std::fmt::Debug {
    /// Identity of the device, available before the port is opened.
    fn info(&self) -> PortInfo;

    /// Current claim state of the two stream halves.
    fn lock_state(&self) -> LockState;

    /// Whether the port is currently open.
    fn is_open(&self) -> bool;

    /// Open the port with the given configuration.
    async fn open(&mut self, config: &PortConfiguration) -> Result<OpenedPort, PortError>;

    /// Close the port. Closing an already-closed port succeeds. Callers drop
    /// the stream halves from `open` first; some transports only release the
    /// device once those are gone.
    async fn close(&mut self) -> Result<(), PortError>;
}
