//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIAL_LINE_CONTROLLER";

/// Config file name
const CONFIG_FILE_NAME: &str = "serial-line-controller.toml";

/// Directory name under the platform config dir
const APP_DIR_NAME: &str = "serial-line-controller";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SERIAL_LINE_CONTROLLER_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SERIAL_LINE_CONTROLLER_CONFIG` environment variable (explicit path)
    /// 2. `./serial-line-controller.toml` (current directory)
    /// 3. `~/.config/serial-line-controller/serial-line-controller.toml` (XDG on Linux/macOS)
    /// 4. `%APPDATA%\serial-line-controller\serial-line-controller.toml` (Windows)
    /// 5. Built-in defaults (no file required)
    ///
    /// Environment variables override file values. The result is validated.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        let _ = apply_env_overrides(&mut config);

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a mutable reference to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. XDG config directory (Linux/macOS) or APPDATA (Windows)
    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Some(app_config);
        }
    }

    None
}

/// Get the platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(toml::from_str(&content)?)
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Unwritable {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::Unwritable {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read and parse `SERIAL_LINE_CONTROLLER_<name>` if it is set.
fn env_value<T: FromStr>(name: &str, expected: &'static str) -> ConfigResult<Option<T>> {
    let var = format!("{}_{}", ENV_PREFIX, name);
    let Ok(value) = std::env::var(&var) else {
        return Ok(None);
    };
    match value.trim().parse() {
        Ok(parsed) => Ok(Some(parsed)),
        Err(_) => Err(ConfigError::BadOverride {
            var,
            value,
            expected,
        }),
    }
}

fn env_flag(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `SERIAL_LINE_CONTROLLER_<SECTION>_<KEY>`
/// For example:
/// - `SERIAL_LINE_CONTROLLER_SERIAL_BAUD_RATE=9600`
/// - `SERIAL_LINE_CONTROLLER_FRAMING_DELIMITER=\r\n`
/// - `SERIAL_LINE_CONTROLLER_DEVICES_AUTHORIZED_PORTS=COM3,COM4`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Serial overrides
    if let Some(val) = env_value("SERIAL_BAUD_RATE", "baud rate")? {
        config.serial.baud_rate = val;
    }
    if let Some(val) = env_value("SERIAL_BUFFER_SIZE", "buffer size")? {
        config.serial.buffer_size = val;
    }
    if let Some(val) = env_value("SERIAL_TIMEOUT_MS", "timeout")? {
        config.serial.timeout_ms = val;
    }

    // Framing overrides
    if let Ok(val) = std::env::var(format!("{}_FRAMING_DECODE_TEXT", ENV_PREFIX)) {
        config.framing.decode_text = env_flag(&val);
    }
    if let Ok(val) = std::env::var(format!("{}_FRAMING_DELIMITER", ENV_PREFIX)) {
        config.framing.delimiter = val;
    }

    // Device overrides
    if let Ok(val) = std::env::var(format!("{}_DEVICES_AUTHORIZED_PORTS", ENV_PREFIX)) {
        config.devices.authorized_ports = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(val) = env_value("DEVICES_PRESENCE_POLL_MS", "poll interval")? {
        config.devices.presence_poll_ms = val;
    }
    if let Some(val) = env_value("DEVICES_RECONNECT_DELAY_MS", "reconnect delay")? {
        config.devices.reconnect_delay_ms = val;
    }

    // Logging overrides
    if let Ok(val) = std::env::var(format!("{}_LOGGING_LEVEL", ENV_PREFIX)) {
        config.logging.level = val;
    }

    Ok(())
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join(APP_DIR_NAME))
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}
