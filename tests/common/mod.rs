//! Shared test utilities for serial-line-controller tests.
//!
//! This module provides common test infrastructure including:
//! - Mock devices with pre-programmed responses
//! - Controllers already connected to a mock device
//! - Channel-backed record sinks and disconnect probes
//! - Polling helpers for asynchronous state changes

#![allow(dead_code)]

use serial_line_controller::controller::{ControllerOptions, DisconnectHandler, SerialController};
use serial_line_controller::port::{ConnectionOverrides, MockAuthorizer, MockTransport};
use serial_line_controller::ControllerError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Upper bound for anything the tests wait on.
pub const WAIT: Duration = Duration::from_secs(2);

/// A device that answers `PING\n` with `PONG\n` and `ID?\n` with its name.
pub fn ping_device(port_name: &str) -> MockTransport {
    let device = MockTransport::new(port_name).with_ids(0x2341, 0x0042);
    device.respond_with(|data| match data {
        b"PING\n" => Some(b"PONG\n".to_vec()),
        b"ID?\n" => Some(b"MEGA-01\n".to_vec()),
        _ => None,
    });
    device
}

/// Controller whose authorizer already lists `device`.
pub fn controller_for(device: &MockTransport, options: ControllerOptions) -> SerialController {
    SerialController::new(
        MockAuthorizer::new().with_authorized(device.clone()),
        options,
    )
}

/// Controller with default options, connected to `device`.
pub async fn connected(device: &MockTransport) -> SerialController {
    connected_with(device, ControllerOptions::default(), None).await
}

pub async fn connected_with(
    device: &MockTransport,
    options: ControllerOptions,
    on_disconnect: Option<DisconnectHandler>,
) -> SerialController {
    let controller = controller_for(device, options);
    controller
        .connect(ConnectionOverrides::default(), on_disconnect)
        .await
        .expect("mock connect should succeed");
    controller
}

/// A record sink forwarding into a channel.
pub fn record_channel() -> (
    impl Fn(String) + Send + Sync + 'static,
    UnboundedReceiver<String>,
) {
    let (tx, rx): (UnboundedSender<String>, _) = unbounded_channel();
    let sink = move |record: String| {
        let _ = tx.send(record);
    };
    (sink, rx)
}

/// A disconnect handler forwarding into a channel.
pub fn disconnect_probe() -> (DisconnectHandler, UnboundedReceiver<ControllerError>) {
    let (tx, rx) = unbounded_channel();
    let handler: DisconnectHandler = Arc::new(move |error| {
        let _ = tx.send(error);
    });
    (handler, rx)
}

/// Next item from `rx`, or `None` if nothing arrives within [`WAIT`].
pub async fn next<T>(rx: &mut UnboundedReceiver<T>) -> Option<T> {
    tokio::time::timeout(WAIT, rx.recv()).await.ok().flatten()
}

/// Assert nothing arrives on `rx` for a short while.
pub async fn assert_silent<T: std::fmt::Debug>(rx: &mut UnboundedReceiver<T>) {
    let got = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    match got {
        Ok(Some(item)) => panic!("expected silence, got {item:?}"),
        Ok(None) | Err(_) => {}
    }
}

/// Poll `condition` until it holds or [`WAIT`] expires.
pub async fn wait_for(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
