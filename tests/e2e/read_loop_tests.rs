//! Read loop E2E tests.
//!
//! These tests verify:
//! - Continuous reading re-arms after writes (request/response devices)
//! - Cancellation returns the loop to Idle without losing wire data
//! - Only one loop ever reads at a time
//! - Raw and custom-delimiter modes

use crate::common::{
    assert_silent, connected, connected_with, disconnect_probe, next, ping_device,
    record_channel, wait_for, WAIT,
};
use serial_line_controller::controller::ControllerOptions;
use serial_line_controller::port::MockTransport;
use serial_line_controller::{ControllerError, ReadLoopState};
use std::io::ErrorKind;
use std::time::Duration;

#[tokio::test]
async fn test_continuous_read_delivers_response_to_write() {
    let device = ping_device("MOCK0");
    let controller = connected(&device).await;
    let (sink, mut records) = record_channel();

    controller.continuously_read(sink);
    controller.write("PING\n", true).await.unwrap();

    assert_eq!(next(&mut records).await.as_deref(), Some("PONG"));
    assert!(controller.is_continuously_reading());
    assert!(controller.is_reading());
}

#[tokio::test]
async fn test_write_restarts_loop_after_read_error() {
    let device = ping_device("MOCK0");
    let (handler, mut lost) = disconnect_probe();
    let controller = connected_with(&device, ControllerOptions::default(), Some(handler)).await;
    let (sink, mut records) = record_channel();

    controller.continuously_read(sink);
    device.feed_error(ErrorKind::TimedOut);

    // The loop stops and reports, the session stays up.
    assert!(matches!(next(&mut lost).await, Some(ControllerError::Read(_))));
    assert!(wait_for(|| controller.state() == ReadLoopState::Idle).await);
    assert!(controller.is_connected());
    assert!(controller.is_continuously_reading());

    controller.write("ID?\n", true).await.unwrap();

    assert!(controller.is_reading());
    assert_eq!(next(&mut records).await.as_deref(), Some("MEGA-01"));
}

#[tokio::test]
async fn test_write_without_continuous_mode_does_not_start_loop() {
    let device = ping_device("MOCK0");
    let controller = connected(&device).await;

    controller.write("PING\n", true).await.unwrap();

    assert!(!controller.is_reading());
    assert_eq!(controller.state(), ReadLoopState::Idle);
    // The response waits on the wire for whoever reads next.
    assert_eq!(controller.read_byte().await, "PONG");
}

#[tokio::test]
async fn test_cancel_continuous_read_goes_idle_and_drops_sink() {
    let device = MockTransport::new("MOCK0");
    let controller = connected(&device).await;
    let (sink, mut records) = record_channel();

    controller.continuously_read(sink);
    assert!(controller.is_reading());

    controller.cancel_continuous_read();

    assert!(wait_for(|| controller.state() == ReadLoopState::Idle).await);
    assert!(!controller.is_continuously_reading());
    assert!(!controller.is_reading());

    device.feed(b"late\n");
    assert!(next(&mut records).await.is_none(), "sink must not see late records");
    // The record is still on the wire, not swallowed by the cancelled loop.
    assert_eq!(controller.read_byte().await, "late");
}

#[tokio::test]
async fn test_read_byte_between_loops_keeps_records_whole() {
    let device = MockTransport::new("MOCK0");
    let controller = connected(&device).await;
    let (sink, mut records) = record_channel();

    controller.continuously_read(sink);
    device.feed(b"x\nAB");
    assert_eq!(next(&mut records).await.as_deref(), Some("x"));

    controller.cancel_continuous_read();
    assert!(wait_for(|| controller.state() == ReadLoopState::Idle).await);

    // The half record "AB" stays with the framer; read_byte completes it.
    device.feed(b"CD\n");
    assert_eq!(controller.read_byte().await, "ABCD");

    device.feed(b"EF\n");
    device.finish();
    let (sink, mut rest) = record_channel();
    assert!(controller.read_commands(sink).await.is_none());
    assert_eq!(next(&mut rest).await.as_deref(), Some("EF"));
    assert!(next(&mut rest).await.is_none());
}

#[tokio::test]
async fn test_continuous_read_while_reading_is_noop() {
    let device = MockTransport::new("MOCK0");
    let controller = connected(&device).await;
    let (first, mut first_records) = record_channel();
    let (second, mut second_records) = record_channel();

    controller.continuously_read(first);
    controller.continuously_read(second);

    device.feed(b"once\n");
    assert_eq!(next(&mut first_records).await.as_deref(), Some("once"));
    assert_silent(&mut second_records).await;
    assert_silent(&mut first_records).await;
    assert_eq!(controller.state(), ReadLoopState::Reading);
}

#[tokio::test]
async fn test_read_commands_supersedes_running_loop() {
    let device = MockTransport::new("MOCK0");
    let controller = connected(&device).await;

    let (old_sink, mut old_records) = record_channel();
    let old_loop = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.read_commands(old_sink).await })
    };
    assert!(wait_for(|| controller.is_reading()).await);

    let (new_sink, mut new_records) = record_channel();
    let new_loop = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.read_commands(new_sink).await })
    };

    // The old loop unwinds without an error.
    assert_eq!(old_loop.await.unwrap(), None);

    device.feed(b"to-new\n");
    assert_eq!(next(&mut new_records).await.as_deref(), Some("to-new"));
    assert!(next(&mut old_records).await.is_none());

    device.finish();
    assert_eq!(new_loop.await.unwrap(), None);
    assert_eq!(controller.last_batch(), vec!["to-new"]);
}

#[tokio::test]
async fn test_unlock_after_natural_end_is_harmless() {
    let device = MockTransport::new("MOCK0");
    let controller = connected(&device).await;
    device.feed(b"a\nb");
    device.finish();

    let (sink, mut records) = record_channel();
    assert!(controller.read_commands(sink).await.is_none());
    assert_eq!(next(&mut records).await.as_deref(), Some("a"));
    assert_eq!(next(&mut records).await.as_deref(), Some("b"));

    controller.unlock();
    controller.unlock();
    assert!(!controller.is_reading());
    assert_eq!(controller.state(), ReadLoopState::Idle);
}

#[tokio::test]
async fn test_unlock_cancels_running_loop() {
    let device = MockTransport::new("MOCK0");
    let controller = connected(&device).await;

    let running = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.read_commands(|_| {}).await })
    };
    assert!(wait_for(|| controller.is_reading()).await);

    controller.unlock();
    assert!(!controller.is_reading());
    assert_eq!(running.await.unwrap(), None);
}

#[tokio::test]
async fn test_read_byte_rejected_while_loop_holds_reader() {
    let device = MockTransport::new("MOCK0");
    let controller = connected(&device).await;
    let (sink, _records) = record_channel();

    controller.continuously_read(sink);
    // Give the spawned loop a chance to take the reader token.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let message = tokio::time::timeout(WAIT, controller.read_byte())
        .await
        .expect("read_byte must not wait behind the loop");
    assert!(message.contains("locked"), "unexpected: {message}");
}

#[tokio::test]
async fn test_empty_records_are_not_delivered() {
    let device = MockTransport::new("MOCK0");
    let controller = connected(&device).await;
    device.feed(b"\n\nx\n\n");
    device.finish();

    let (sink, mut records) = record_channel();
    controller.read_commands(sink).await;

    assert_eq!(next(&mut records).await.as_deref(), Some("x"));
    assert!(next(&mut records).await.is_none());
}

#[tokio::test]
async fn test_raw_mode_delivers_unsplit_chunks() {
    let device = MockTransport::new("MOCK0");
    let options = ControllerOptions {
        decode_text: false,
        ..Default::default()
    };
    let controller = connected_with(&device, options, None).await;
    device.feed(b"one\r\ntwo");
    device.finish();

    let (sink, mut records) = record_channel();
    controller.read_commands(sink).await;

    assert_eq!(next(&mut records).await.as_deref(), Some("one\r\ntwo"));
}

#[tokio::test]
async fn test_crlf_delimiter_across_chunks() {
    let device = MockTransport::new("MOCK0");
    let options = ControllerOptions {
        delimiter: "\r\n".to_string(),
        ..Default::default()
    };
    let controller = connected_with(&device, options, None).await;
    device.feed(b"OK\r");
    device.feed(b"\nREADY\r\n");
    device.finish();

    let (sink, mut records) = record_channel();
    controller.read_commands(sink).await;

    assert_eq!(next(&mut records).await.as_deref(), Some("OK"));
    assert_eq!(next(&mut records).await.as_deref(), Some("READY"));
}
