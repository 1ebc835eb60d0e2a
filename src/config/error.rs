//! Errors raised while loading, checking or saving controller settings.

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong between a settings file and a usable [`Config`](super::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read settings from {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings file: {0}")]
    Malformed(#[from] toml::de::Error),

    #[error("cannot encode settings as TOML: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("cannot save settings to {}: {source}", path.display())]
    Unwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A `[serial]` value the port could never be opened with.
    #[error("[serial] {field}: {reason}")]
    SerialLine { field: &'static str, reason: String },

    /// The record delimiter expands to nothing.
    #[error("[framing] delimiter {0:?} is empty once escapes are expanded")]
    EmptyDelimiter(String),

    /// A blank entry in one of the device whitelists.
    #[error("[devices] {list} contains a blank entry at position {index}")]
    BlankWhitelistEntry { list: &'static str, index: usize },

    /// An environment override that does not parse.
    #[error("{var}={value:?} is not a valid {expected}")]
    BadOverride {
        var: String,
        value: String,
        expected: &'static str,
    },
}

impl ConfigError {
    pub fn serial_line(field: &'static str, reason: impl Into<String>) -> Self {
        Self::SerialLine {
            field,
            reason: reason.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
