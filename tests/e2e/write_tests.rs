//! Write path E2E tests.

use crate::common::{connected, next, ping_device, record_channel};
use serial_line_controller::port::MockTransport;
use serial_line_controller::{ControllerError, SerialController, MockAuthorizer};

#[tokio::test]
async fn test_write_before_connect_returns_none() {
    let controller = SerialController::with_defaults(MockAuthorizer::new());
    assert!(!controller.is_writeable());
    assert_eq!(controller.write("PING\n", true).await.unwrap(), None);
}

#[tokio::test]
async fn test_writes_are_sent_whole_and_in_order() {
    let device = MockTransport::new("MOCK0");
    let controller = connected(&device).await;

    for command in ["LED ON\n", "LED OFF\n", "STATUS\n"] {
        assert_eq!(
            controller.write(command, true).await.unwrap(),
            Some(command.len())
        );
    }

    assert_eq!(
        device.write_log(),
        vec![
            b"LED ON\n".to_vec(),
            b"LED OFF\n".to_vec(),
            b"STATUS\n".to_vec()
        ]
    );
}

#[tokio::test]
async fn test_retained_writer_rejects_second_write() {
    let device = MockTransport::new("MOCK0");
    let controller = connected(&device).await;

    controller.write("HOLD\n", false).await.unwrap();
    assert!(!controller.is_writeable());

    let second = controller.write("AGAIN\n", true).await;
    assert!(matches!(second, Err(ControllerError::WriterLocked)));
    assert_eq!(device.write_log().len(), 1);

    assert!(controller.release_writer());
    assert!(controller.is_writeable());
    controller.write("AGAIN\n", true).await.unwrap();
    assert_eq!(device.write_log().len(), 2);
}

#[tokio::test]
async fn test_disconnect_releases_retained_writer() {
    let device = MockTransport::new("MOCK0");
    let controller = connected(&device).await;
    controller.write("HOLD\n", false).await.unwrap();

    controller.disconnect().await;
    assert!(!controller.release_writer());

    controller
        .connect(Default::default(), None)
        .await
        .unwrap();
    assert!(controller.is_writeable());
    assert_eq!(controller.write("NEW\n", true).await.unwrap(), Some(4));
}

#[tokio::test]
async fn test_write_while_reading_is_allowed() {
    let device = ping_device("MOCK0");
    let controller = connected(&device).await;
    let (sink, mut records) = record_channel();

    controller.continuously_read(sink);
    assert!(controller.is_reading());

    assert_eq!(controller.write("PING\n", true).await.unwrap(), Some(5));
    assert_eq!(next(&mut records).await.as_deref(), Some("PONG"));
    assert!(!controller.is_writing());
}
