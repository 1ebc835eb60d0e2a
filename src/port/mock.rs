//! Mock serial transport for testing.
//!
//! `MockTransport` simulates a microcontroller on the far side of a serial link
//! without requiring hardware. A clone of the transport doubles as the device
//! handle: tests feed chunks, inject read failures, end the stream, unplug the
//! device and inspect what the controller wrote.

use super::error::PortError;
use super::traits::{
    LockState, OpenedPort, PortConfiguration, PortInfo, PortReader, PortWriter, SerialTransport,
};
use crate::authorization::{AuthorizationError, PortAuthorizer};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{mpsc, oneshot};

/// Device-side response hook: given the bytes of one write, optionally
/// produce bytes the device sends back.
pub type Responder = Arc<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

/// One item travelling from the simulated device to the host.
#[derive(Debug)]
enum MockChunk {
    Data(Vec<u8>),
    Error(io::ErrorKind),
    Eof,
}

/// Inner state of the mock port, shared between every clone.
#[derive(Default)]
struct MockPortState {
    open: bool,
    open_count: usize,
    fail_next_open: Option<String>,
    last_config: Option<PortConfiguration>,
    /// Chunks queued while the port is closed, delivered on the next open.
    backlog: Vec<MockChunk>,
    feed: Option<mpsc::UnboundedSender<MockChunk>>,
    disconnect: Option<oneshot::Sender<String>>,
    write_log: Vec<Vec<u8>>,
    responder: Option<Responder>,
    /// Stream halves handed out and not yet dropped.
    live_halves: usize,
}

impl MockPortState {
    fn push(&mut self, chunk: MockChunk) {
        match &self.feed {
            Some(feed) => {
                // A send error means the reader half was dropped; nobody is listening.
                let _ = feed.send(chunk);
            }
            None => self.backlog.push(chunk),
        }
    }
}

/// Mock serial transport.
///
/// # Example
/// ```
/// use serial_line_controller::port::{MockTransport, SerialTransport};
///
/// let device = MockTransport::new("MOCK0").with_ids(0x2341, 0x0042);
/// device.feed(b"READY\n");
///
/// let info = device.info();
/// assert_eq!(info.vendor_id, Some(0x2341));
/// assert!(!device.is_open());
/// ```
#[derive(Clone)]
pub struct MockTransport {
    info: PortInfo,
    state: Arc<Mutex<MockPortState>>,
}

impl MockTransport {
    /// Create a new mock port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            info: PortInfo {
                name: name.into(),
                vendor_id: None,
                product_id: None,
            },
            state: Arc::new(Mutex::new(MockPortState::default())),
        }
    }

    /// Attach USB vendor/product ids to the simulated device.
    pub fn with_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.info.vendor_id = Some(vendor_id);
        self.info.product_id = Some(product_id);
        self
    }

    /// Send bytes from the device to the host. Empty slices are ignored,
    /// since a zero-length read means end of stream.
    pub fn feed(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.state.lock().push(MockChunk::Data(data.to_vec()));
    }

    /// Make the next read fail with the given error kind. The stream stays
    /// usable afterwards.
    pub fn feed_error(&self, kind: io::ErrorKind) {
        self.state.lock().push(MockChunk::Error(kind));
    }

    /// End the read stream, as if the device closed its side.
    pub fn finish(&self) {
        self.state.lock().push(MockChunk::Eof);
    }

    /// Simulate the device being unplugged: fire the disconnect signal and end
    /// the read stream.
    pub fn unplug(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        if let Some(signal) = state.disconnect.take() {
            let _ = signal.send(reason.into());
        }
        state.feed = None;
    }

    /// Install a responder invoked for every write.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        self.state.lock().responder = Some(Arc::new(responder));
    }

    /// Make the next `open` call fail with the given message.
    pub fn fail_next_open(&self, message: impl Into<String>) {
        self.state.lock().fail_next_open = Some(message.into());
    }

    /// Get a copy of all data written to the port, one entry per write call.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Read and write halves still held by the host. The real OS handle
    /// would stay open while this is non-zero.
    pub fn live_handles(&self) -> usize {
        self.state.lock().live_halves
    }

    /// Configuration passed to the most recent successful open.
    pub fn last_config(&self) -> Option<PortConfiguration> {
        self.state.lock().last_config.clone()
    }
}

#[async_trait]
impl SerialTransport for MockTransport {
    fn info(&self) -> PortInfo {
        self.info.clone()
    }

    fn lock_state(&self) -> LockState {
        let open = self.state.lock().open;
        LockState {
            readable_locked: open,
            writable_locked: open,
        }
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    async fn open(&mut self, config: &PortConfiguration) -> Result<OpenedPort, PortError> {
        let mut state = self.state.lock();

        if state.open {
            return Err(PortError::AlreadyOpen);
        }
        if let Some(message) = state.fail_next_open.take() {
            return Err(PortError::other(message));
        }

        let (feed, rx) = mpsc::unbounded_channel();
        for chunk in state.backlog.drain(..) {
            let _ = feed.send(chunk);
        }
        let (disconnect_tx, disconnect_rx) = oneshot::channel();

        state.feed = Some(feed);
        state.disconnect = Some(disconnect_tx);
        state.open = true;
        state.open_count += 1;
        state.last_config = Some(config.clone());
        state.live_halves += 2;

        let reader: PortReader = Box::new(MockReadHalf {
            rx,
            leftover: Vec::new(),
            state: Arc::clone(&self.state),
        });
        let writer: PortWriter = Box::new(MockWriteHalf {
            state: Arc::clone(&self.state),
        });

        Ok(OpenedPort {
            reader,
            writer,
            disconnected: Some(disconnect_rx),
        })
    }

    async fn close(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.open = false;
        state.feed = None;
        state.disconnect = None;
        Ok(())
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("info", &self.info)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Host-side read half: drains chunks pushed by the device handle.
struct MockReadHalf {
    rx: mpsc::UnboundedReceiver<MockChunk>,
    leftover: Vec<u8>,
    state: Arc<Mutex<MockPortState>>,
}

impl Drop for MockReadHalf {
    fn drop(&mut self) {
        self.state.lock().live_halves -= 1;
    }
}

impl MockReadHalf {
    fn copy_out(&mut self, bytes: Vec<u8>, buf: &mut ReadBuf<'_>) {
        let n = buf.remaining().min(bytes.len());
        buf.put_slice(&bytes[..n]);
        self.leftover = bytes[n..].to_vec();
    }
}

impl AsyncRead for MockReadHalf {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.leftover.is_empty() {
            let pending = std::mem::take(&mut self.leftover);
            self.copy_out(pending, buf);
            return Poll::Ready(Ok(()));
        }

        match ready!(self.rx.poll_recv(cx)) {
            Some(MockChunk::Data(bytes)) => {
                self.copy_out(bytes, buf);
                Poll::Ready(Ok(()))
            }
            Some(MockChunk::Error(kind)) => {
                Poll::Ready(Err(io::Error::new(kind, "mock read failure")))
            }
            // End of stream: leave the buffer untouched.
            Some(MockChunk::Eof) | None => Poll::Ready(Ok(())),
        }
    }
}

/// Host-side write half: records each write and runs the responder.
struct MockWriteHalf {
    state: Arc<Mutex<MockPortState>>,
}

impl Drop for MockWriteHalf {
    fn drop(&mut self) {
        self.state.lock().live_halves -= 1;
    }
}

impl AsyncWrite for MockWriteHalf {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.state.lock();
        if !state.open {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "mock port is closed",
            )));
        }

        state.write_log.push(buf.to_vec());
        if let Some(responder) = state.responder.clone() {
            if let Some(reply) = responder(buf) {
                if !reply.is_empty() {
                    state.push(MockChunk::Data(reply));
                }
            }
        }

        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Mock authorization boundary.
///
/// Holds a list of "previously authorized" ports and an optional port that a
/// fresh authorization request would grant. Without one, requests are denied.
pub struct MockAuthorizer {
    available: bool,
    authorized: Vec<MockTransport>,
    requestable: Option<MockTransport>,
    request_count: AtomicUsize,
}

impl MockAuthorizer {
    /// An authorizer with no ports at all; every request is denied.
    pub fn new() -> Self {
        Self {
            available: true,
            authorized: Vec::new(),
            requestable: None,
            request_count: AtomicUsize::new(0),
        }
    }

    /// An authorizer reporting that the host has no serial capability.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Register a port as previously authorized.
    pub fn with_authorized(mut self, port: MockTransport) -> Self {
        self.authorized.push(port);
        self
    }

    /// Register the port a fresh authorization request will grant.
    pub fn with_requestable(mut self, port: MockTransport) -> Self {
        self.requestable = Some(port);
        self
    }

    /// How many times a fresh authorization was requested.
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

impl Default for MockAuthorizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PortAuthorizer for MockAuthorizer {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn authorized_ports(&self) -> Result<Vec<Box<dyn SerialTransport>>, AuthorizationError> {
        Ok(self
            .authorized
            .iter()
            .cloned()
            .map(|port| Box::new(port) as Box<dyn SerialTransport>)
            .collect())
    }

    async fn request_port(&self) -> Result<Box<dyn SerialTransport>, AuthorizationError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        match &self.requestable {
            Some(port) => Ok(Box::new(port.clone())),
            None => Err(AuthorizationError::Denied(
                "user dismissed the port chooser".to_string(),
            )),
        }
    }
}
