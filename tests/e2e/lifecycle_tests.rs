//! Connection lifecycle E2E tests: acquire -> open -> disconnect/unplug -> reconnect
//!
//! These tests verify:
//! - Previously authorized ports are reused without a new request
//! - Denied or empty authorization surfaces as PortNotFound
//! - Open failures carry lock-state diagnostics
//! - Device removal tears the session down and notifies the caller

use crate::common::{connected, connected_with, disconnect_probe, next, record_channel, wait_for};
use serial_line_controller::controller::{ControllerOptions, SerialController};
use serial_line_controller::port::{
    ConnectionOverrides, MockAuthorizer, MockTransport, PortConfiguration, SerialTransport,
};
use serial_line_controller::{ControllerError, ReadLoopState};

#[tokio::test]
async fn test_denied_authorization_is_port_not_found() {
    let authorizer = MockAuthorizer::new();
    let controller = SerialController::with_defaults(authorizer);

    let result = controller.connect(ConnectionOverrides::default(), None).await;

    assert!(
        matches!(result, Err(ControllerError::PortNotFound(_))),
        "expected PortNotFound, got {result:?}"
    );
    assert!(!controller.is_connected());
}

#[tokio::test]
async fn test_fresh_authorization_used_when_none_stored() {
    let device = MockTransport::new("COM4").with_ids(0x2341, 0x0043);
    let controller =
        SerialController::with_defaults(MockAuthorizer::new().with_requestable(device.clone()));

    let info = controller
        .connect(ConnectionOverrides::default(), None)
        .await
        .unwrap();

    assert_eq!(info.port_name, "COM4");
    assert_eq!(info.vendor_id, Some(0x2341));
    assert!(device.is_open());
}

#[tokio::test]
async fn test_open_failure_reports_lock_state() {
    let device = MockTransport::new("COM5");
    // Someone else already holds the port.
    let mut other_holder = device.clone();
    other_holder
        .open(&PortConfiguration::default())
        .await
        .unwrap();

    let controller =
        SerialController::with_defaults(MockAuthorizer::new().with_authorized(device.clone()));
    let result = controller.connect(ConnectionOverrides::default(), None).await;

    match result {
        Err(ControllerError::PortOpenFailed {
            port,
            readable_locked,
            writable_locked,
            ..
        }) => {
            assert_eq!(port, "COM5");
            assert!(readable_locked);
            assert!(writable_locked);
        }
        other => panic!("expected PortOpenFailed, got {other:?}"),
    }
    assert!(!controller.is_connected());
}

#[tokio::test]
async fn test_plain_open_failure() {
    let device = MockTransport::new("COM6");
    device.fail_next_open("access denied");
    let controller =
        SerialController::with_defaults(MockAuthorizer::new().with_authorized(device.clone()));

    let result = controller.connect(ConnectionOverrides::default(), None).await;
    assert!(matches!(
        result,
        Err(ControllerError::PortOpenFailed {
            readable_locked: false,
            writable_locked: false,
            ..
        })
    ));

    // The failure is not sticky.
    controller
        .connect(ConnectionOverrides::default(), None)
        .await
        .unwrap();
    assert!(controller.is_connected());
}

#[tokio::test]
async fn test_unplug_tears_down_and_notifies() {
    let device = MockTransport::new("COM7");
    let (handler, mut lost) = disconnect_probe();
    let controller = connected_with(&device, ControllerOptions::default(), Some(handler)).await;

    let (sink, _records) = record_channel();
    controller.continuously_read(sink);
    assert!(controller.is_reading());

    device.unplug("cable pulled");

    match next(&mut lost).await {
        Some(ControllerError::Disconnected(reason)) => assert_eq!(reason, "cable pulled"),
        other => panic!("expected Disconnected, got {other:?}"),
    }
    assert!(!controller.is_connected());
    assert!(!controller.is_continuously_reading());
    assert!(wait_for(|| controller.state() == ReadLoopState::Stopped).await);
    assert!(!device.is_open());
}

#[tokio::test]
async fn test_reconnect_after_unplug() {
    let device = MockTransport::new("COM8");
    let (handler, mut lost) = disconnect_probe();
    let controller =
        connected_with(&device, ControllerOptions::default(), Some(handler.clone())).await;

    device.unplug("usb reset");
    assert!(next(&mut lost).await.is_some());

    controller
        .connect(ConnectionOverrides::default(), Some(handler))
        .await
        .unwrap();
    assert_eq!(device.open_count(), 2);
    assert_eq!(controller.state(), ReadLoopState::Idle);

    device.feed(b"back\n");
    let (sink, mut records) = record_channel();
    controller.continuously_read(sink);
    assert_eq!(next(&mut records).await.as_deref(), Some("back"));
}

#[tokio::test]
async fn test_disconnect_stops_continuous_read() {
    let device = MockTransport::new("COM9");
    let (handler, mut lost) = disconnect_probe();
    let controller = connected_with(&device, ControllerOptions::default(), Some(handler)).await;

    let (sink, mut records) = record_channel();
    controller.continuously_read(sink);
    device.feed(b"first\n");
    assert_eq!(next(&mut records).await.as_deref(), Some("first"));

    controller.disconnect().await;

    assert!(!controller.is_connected());
    assert!(!controller.is_continuously_reading());
    assert_eq!(controller.state(), ReadLoopState::Stopped);
    // An explicit disconnect is not reported as a link failure, and the sink
    // is released once the loop is gone.
    assert!(next(&mut records).await.is_none());
    assert!(lost.try_recv().is_err());
}

#[tokio::test]
async fn test_disconnect_returns_after_loop_drops_stream_halves() {
    let device = MockTransport::new("COM10");
    let controller = connected(&device).await;
    assert_eq!(device.live_handles(), 2);

    let (sink, _records) = record_channel();
    controller.continuously_read(sink);
    assert!(wait_for(|| controller.is_reading()).await);

    controller.disconnect().await;

    // Nothing holds the port any more, so an immediate reopen can succeed.
    assert_eq!(device.live_handles(), 0);
    controller
        .connect(ConnectionOverrides::default(), None)
        .await
        .unwrap();
    assert_eq!(device.live_handles(), 2);
}
