//! Serial Line Controller Library
//!
//! Turns a full-duplex serial byte stream to a microcontroller into a
//! line-oriented command channel: connect/disconnect lifecycle, delimiter
//! framing, a cancellable and restartable read loop, and a write path that
//! re-arms continuous reading after every command.
//!
//! # Modules
//!
//! - `controller`: the `SerialController` caller API
//! - `framer`: delimiter-based record framing
//! - `reader`: framer wired onto a port's read half
//! - `state`: read loop state machine
//! - `port`: transport trait, tokio-serial transport and mock device
//! - `authorization`: port grants and selection policy
//! - `config`: configuration management with TOML support
//! - `error`: caller-facing error taxonomy

pub mod authorization;
pub mod config;
pub mod controller;
pub mod error;
pub mod framer;
pub mod port;
pub mod reader;
pub mod state;

// Re-export commonly used types for convenience
pub use authorization::{
    AuthorizationError, PortAuthorizer, PortCandidate, PortSelector, SystemPortAuthorizer,
    WhitelistSelector,
};
pub use controller::{
    ConnectionInfo, ControllerOptions, DisconnectHandler, RecordSink, SerialController,
};
pub use error::{ControllerError, ControllerResult};
pub use framer::{FramingError, LineFramer};
pub use port::{
    ConnectionOverrides, DataBits, FlowControl, MockAuthorizer, MockTransport, Parity,
    PortConfiguration, PortError, SerialTransport, StopBits,
};
pub use reader::{ReadOutcome, RecordReader};
pub use state::ReadLoopState;

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
