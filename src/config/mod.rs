//! Configuration module for serial-line-controller.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIAL_LINE_CONTROLLER_CONFIG` environment variable (explicit path)
//! 2. `./serial-line-controller.toml` (current directory)
//! 3. `~/.config/serial-line-controller/serial-line-controller.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\serial-line-controller\serial-line-controller.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is: `SERIAL_LINE_CONTROLLER_<SECTION>_<KEY>`
//!
//! Examples:
//! - `SERIAL_LINE_CONTROLLER_SERIAL_BAUD_RATE=9600`
//! - `SERIAL_LINE_CONTROLLER_FRAMING_DELIMITER=\r\n`
//! - `SERIAL_LINE_CONTROLLER_LOGGING_LEVEL=debug`
//!
//! # Example
//!
//! ```rust,no_run
//! use serial_line_controller::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//!
//! println!("Default baud: {}", config.serial.baud_rate);
//! # Ok::<(), serial_line_controller::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{
    Config, DevicesConfig, FramingConfig, LogFormat, LoggingConfig, SerialConfig,
};
