//! Port abstraction layer for serial communication.
//!
//! Provides the transport trait, its configuration types, a tokio-serial
//! implementation and a mock device for tests.

pub mod async_port;
pub mod error;
pub mod mock;
pub mod traits;

pub use async_port::TokioSerialTransport;
pub use error::PortError;
pub use mock::{MockAuthorizer, MockTransport, Responder};
pub use traits::*;
