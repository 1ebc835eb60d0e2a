//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All sections carry defaults, so an empty file is a valid configuration.

use super::error::{ConfigError, ConfigResult};
use crate::authorization::DEFAULT_NAME_WHITELIST;
use crate::framer::unescape_delimiter;
use crate::port::{
    DataBits, FlowControl, Parity, PortConfiguration, StopBits, DEFAULT_BAUD_RATE,
    DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Line parameters used when a connect call does not override them
    pub serial: SerialConfig,
    /// How incoming bytes are turned into records
    pub framing: FramingConfig,
    /// Device selection and presence tracking
    pub devices: DevicesConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values no port can be opened with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::serial_line(
                "baud_rate",
                "must be a positive integer",
            ));
        }
        if self.serial.buffer_size == 0 || self.serial.buffer_size >= MAX_BUFFER_SIZE {
            return Err(ConfigError::serial_line(
                "buffer_size",
                format!("must be between 1 and {}", MAX_BUFFER_SIZE - 1),
            ));
        }
        if self.framing.delimiter().is_empty() {
            return Err(ConfigError::EmptyDelimiter(self.framing.delimiter.clone()));
        }
        for (list, entries) in [
            ("name_whitelist", &self.devices.name_whitelist),
            ("instance_whitelist", &self.devices.instance_whitelist),
            ("authorized_ports", &self.devices.authorized_ports),
        ] {
            if let Some(index) = entries.iter().position(|e| e.trim().is_empty()) {
                return Err(ConfigError::BlankWhitelistEntry { list, index });
            }
        }
        Ok(())
    }
}

/// Serial line section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
    /// Bytes requested per transport read
    pub buffer_size: usize,
    /// Low-level transport timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            timeout_ms: 1000,
        }
    }
}

impl SerialConfig {
    /// Get the timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The port configuration connects fall back to.
    pub fn port_configuration(&self) -> PortConfiguration {
        PortConfiguration {
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
            flow_control: self.flow_control,
            buffer_size: self.buffer_size,
            timeout: self.timeout(),
        }
    }
}

/// Record framing section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Split incoming text on `delimiter`; when false, deliver raw chunks
    pub decode_text: bool,
    /// Record delimiter. Escapes such as `\n` and `\r\n` are accepted.
    pub delimiter: String,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            decode_text: true,
            delimiter: "\n".to_string(),
        }
    }
}

impl FramingConfig {
    /// Delimiter with escape sequences expanded.
    pub fn delimiter(&self) -> String {
        unescape_delimiter(&self.delimiter)
    }
}

/// Device selection section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// USB product names picked without a prompt
    pub name_whitelist: Vec<String>,
    /// Hardware instance ids picked without a prompt
    pub instance_whitelist: Vec<String>,
    /// Port names treated as already granted
    pub authorized_ports: Vec<String>,
    /// How often an open port is checked for removal
    pub presence_poll_ms: u64,
    /// Delay before the monitor reconnects after a disconnect
    pub reconnect_delay_ms: u64,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            name_whitelist: DEFAULT_NAME_WHITELIST.iter().map(|s| s.to_string()).collect(),
            instance_whitelist: Vec::new(),
            authorized_ports: Vec::new(),
            presence_poll_ms: 1000,
            reconnect_delay_ms: 1000,
        }
    }
}

impl DevicesConfig {
    pub fn presence_poll(&self) -> Duration {
        Duration::from_millis(self.presence_poll_ms.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}
