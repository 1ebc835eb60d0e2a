//! Line-oriented command channel over one serial connection.
//!
//! # Architecture
//!
//! ```text
//! caller ──> SerialController ──> PortAuthorizer ──> SerialTransport
//!                 │
//!                 ├── reader token: Mutex<RecordReader>  (read loop / read_byte)
//!                 └── writer token: Mutex<PortWriter>    (write)
//! ```
//!
//! The reader and writer tokens are independent, so a write may happen while a
//! read loop is waiting for data. Each token has at most one holder at a time.

mod read_loop;
mod write;

use crate::authorization::PortAuthorizer;
use crate::config::Config;
use crate::error::{ControllerError, ControllerResult};
use crate::framer::LineFramer;
use crate::port::{ConnectionOverrides, PortConfiguration, PortWriter, SerialTransport};
use crate::reader::RecordReader;
use crate::state::{LoopControl, ReadLoopState};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub use crate::state::RecordSink;

/// How long teardown waits for a cancelled read loop to drop the reader.
const HANDLE_RELEASE_WAIT: Duration = Duration::from_millis(500);

/// Callback told about link failures: read errors and device removal.
pub type DisconnectHandler = Arc<dyn Fn(ControllerError) + Send + Sync>;

/// Behaviour fixed for the life of a controller.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Split incoming text into records; when false, deliver raw chunks.
    pub decode_text: bool,
    /// Record delimiter used in text mode.
    pub delimiter: String,
    /// Port parameters that connect overrides are merged over.
    pub port_defaults: PortConfiguration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            decode_text: true,
            delimiter: "\n".to_string(),
            port_defaults: PortConfiguration::default(),
        }
    }
}

impl ControllerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            decode_text: config.framing.decode_text,
            delimiter: config.framing.delimiter(),
            port_defaults: config.serial.port_configuration(),
        }
    }
}

/// What `connect` reports back about the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub connected: bool,
    pub port_name: String,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

/// An opened port and the two tokens carved out of it.
struct PortSession {
    id: u64,
    transport: Box<dyn SerialTransport>,
    config: PortConfiguration,
    info: ConnectionInfo,
    reader: Arc<tokio::sync::Mutex<RecordReader>>,
    writer: Arc<tokio::sync::Mutex<PortWriter>>,
    watcher: Option<JoinHandle<()>>,
}

struct ControllerInner {
    authorizer: Box<dyn PortAuthorizer>,
    options: ControllerOptions,
    /// Serializes connect and teardown.
    lifecycle: tokio::sync::Mutex<()>,
    session: Mutex<Option<PortSession>>,
    control: Mutex<LoopControl>,
    /// Writer token kept after `write(.., false)`.
    held_writer: Mutex<Option<OwnedMutexGuard<PortWriter>>>,
    writing: AtomicBool,
    next_session: AtomicU64,
    disconnect_handler: Mutex<Option<DisconnectHandler>>,
}

/// Serial controller handle. Cheap to clone; clones share one connection.
///
/// # Example
/// ```
/// use serial_line_controller::controller::SerialController;
/// use serial_line_controller::port::{ConnectionOverrides, MockAuthorizer, MockTransport};
///
/// # tokio_test::block_on(async {
/// let device = MockTransport::new("MOCK0").with_ids(0x2341, 0x0042);
/// let controller = SerialController::with_defaults(
///     MockAuthorizer::new().with_authorized(device.clone()),
/// );
///
/// let info = controller.connect(ConnectionOverrides::default(), None).await.unwrap();
/// assert_eq!(info.vendor_id, Some(0x2341));
///
/// controller.write("PING\n", true).await.unwrap();
/// assert_eq!(device.write_log(), vec![b"PING\n".to_vec()]);
/// controller.disconnect().await;
/// # });
/// ```
#[derive(Clone)]
pub struct SerialController {
    inner: Arc<ControllerInner>,
}

impl SerialController {
    pub fn new(authorizer: impl PortAuthorizer + 'static, options: ControllerOptions) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                authorizer: Box::new(authorizer),
                options,
                lifecycle: tokio::sync::Mutex::new(()),
                session: Mutex::new(None),
                control: Mutex::new(LoopControl::default()),
                held_writer: Mutex::new(None),
                writing: AtomicBool::new(false),
                next_session: AtomicU64::new(0),
                disconnect_handler: Mutex::new(None),
            }),
        }
    }

    pub fn with_defaults(authorizer: impl PortAuthorizer + 'static) -> Self {
        Self::new(authorizer, ControllerOptions::default())
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.inner.options
    }

    /// Acquire a port, open it and attach the reader and writer tokens.
    ///
    /// A previously authorized port is preferred; otherwise a new grant is
    /// requested. Calling this while connected returns the current connection
    /// without touching the port.
    ///
    /// # Errors
    ///
    /// - `ControllerError::TransportUnavailable` if the host has no serial support
    /// - `ControllerError::InvalidConfig` if the merged configuration is rejected
    /// - `ControllerError::PortNotFound` if no port was granted
    /// - `ControllerError::PortOpenFailed` if the granted port fails to open
    pub async fn connect(
        &self,
        overrides: ConnectionOverrides,
        on_disconnect: Option<DisconnectHandler>,
    ) -> ControllerResult<ConnectionInfo> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        if !self.inner.authorizer.is_available().await {
            return Err(ControllerError::TransportUnavailable);
        }
        if let Some(info) = self.connection_info() {
            info!("Already connected to {}", info.port_name);
            return Ok(info);
        }

        let options = &self.inner.options;
        let config = overrides
            .merge_over(&options.port_defaults)
            .map_err(|e| ControllerError::InvalidConfig(e.to_string()))?;
        let framer = if options.decode_text {
            Some(
                LineFramer::new(&options.delimiter)
                    .map_err(|e| ControllerError::InvalidConfig(e.to_string()))?,
            )
        } else {
            None
        };

        let mut transport = self.acquire_port().await?;
        let port = transport.info();
        let opened = match transport.open(&config).await {
            Ok(opened) => opened,
            Err(source) => {
                let locks = transport.lock_state();
                error!("Failed to open {}: {}", port.name, source);
                return Err(ControllerError::PortOpenFailed {
                    port: port.name,
                    readable_locked: locks.readable_locked,
                    writable_locked: locks.writable_locked,
                    source,
                });
            }
        };

        let reader = match framer {
            Some(framer) => RecordReader::framed(opened.reader, framer, config.buffer_size),
            None => RecordReader::raw(opened.reader, config.buffer_size),
        };
        let id = self.inner.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let watcher = opened.disconnected.map(|signal| {
            tokio::spawn(watch_disconnect(Arc::downgrade(&self.inner), id, signal))
        });
        let info = ConnectionInfo {
            connected: true,
            port_name: port.name,
            vendor_id: port.vendor_id,
            product_id: port.product_id,
        };

        *self.inner.disconnect_handler.lock() = on_disconnect;
        self.inner.held_writer.lock().take();
        self.inner.control.lock().reset();
        *self.inner.session.lock() = Some(PortSession {
            id,
            transport,
            config: config.clone(),
            info: info.clone(),
            reader: Arc::new(tokio::sync::Mutex::new(reader)),
            writer: Arc::new(tokio::sync::Mutex::new(opened.writer)),
            watcher,
        });

        info!(
            "Connected to {} at {} baud ({})",
            info.port_name,
            config.baud_rate,
            if options.decode_text { "text" } else { "raw" }
        );
        Ok(info)
    }

    /// Cancel any read loop, release both tokens and close the port.
    /// Does nothing when not connected.
    pub async fn disconnect(&self) {
        self.teardown(None).await;
    }

    async fn acquire_port(&self) -> ControllerResult<Box<dyn SerialTransport>> {
        match self.inner.authorizer.authorized_ports().await {
            Ok(ports) => {
                if let Some(port) = ports.into_iter().next() {
                    debug!("Reusing previously authorized port {}", port.info().name);
                    return Ok(port);
                }
                debug!("No previously authorized port");
            }
            Err(e) => debug!("Could not list authorized ports: {}", e),
        }

        self.inner.authorizer.request_port().await.map_err(|e| {
            warn!("Port authorization failed: {}", e);
            ControllerError::PortNotFound(e.to_string())
        })
    }

    /// Tear down the current session. With `only_session`, a session other
    /// than that one is left alone. Returns whether a session was closed.
    async fn teardown(&self, only_session: Option<u64>) -> bool {
        let _lifecycle = self.inner.lifecycle.lock().await;

        let session = {
            let mut slot = self.inner.session.lock();
            let current = slot.as_ref().map(|s| s.id);
            if current.is_none() || only_session.is_some_and(|id| current != Some(id)) {
                return false;
            }
            slot.take()
        };
        let Some(session) = session else {
            return false;
        };
        let PortSession {
            mut transport,
            info,
            reader,
            writer,
            watcher,
            ..
        } = session;

        self.inner.control.lock().stop();
        self.inner.held_writer.lock().take();
        self.inner.writing.store(false, Ordering::SeqCst);

        if let Some(watcher) = watcher {
            // The watcher calls in here itself; it must not abort its own task.
            if only_session.is_none() {
                watcher.abort();
            }
        }

        // The OS handle stays open until both stream halves drop. Wait for the
        // cancelled read loop and any in-flight write to let go first.
        let released = async {
            sole_owner(&reader).await;
            sole_owner(&writer).await;
        };
        if tokio::time::timeout(HANDLE_RELEASE_WAIT, released).await.is_err() {
            warn!(
                "Streams for {} still busy after {:?}; closing anyway",
                info.port_name, HANDLE_RELEASE_WAIT
            );
        }
        drop(reader);
        drop(writer);

        if let Err(e) = transport.close().await {
            warn!("Error closing {}: {}", info.port_name, e);
        }
        info!("Disconnected from {}", info.port_name);
        true
    }

    fn notify_disconnect(&self, error: ControllerError) {
        let handler = self.inner.disconnect_handler.lock().clone();
        match handler {
            Some(handler) => handler(error),
            None => debug!("No disconnect handler registered for: {}", error),
        }
    }

    fn reader_handle(&self) -> Option<Arc<tokio::sync::Mutex<RecordReader>>> {
        self.inner.session.lock().as_ref().map(|s| Arc::clone(&s.reader))
    }

    fn writer_handle(&self) -> Option<Arc<tokio::sync::Mutex<PortWriter>>> {
        self.inner.session.lock().as_ref().map(|s| Arc::clone(&s.writer))
    }

    // ========== Status ==========

    /// Whether this host can reach serial devices at all.
    pub async fn is_available(&self) -> bool {
        self.inner.authorizer.is_available().await
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.lock().is_some()
    }

    pub fn is_readable(&self) -> bool {
        self.is_connected()
    }

    /// Connected, and no writer token is being retained.
    pub fn is_writeable(&self) -> bool {
        self.is_connected() && self.inner.held_writer.lock().is_none()
    }

    pub fn is_reading(&self) -> bool {
        self.inner.control.lock().is_reading()
    }

    pub fn is_writing(&self) -> bool {
        self.inner.writing.load(Ordering::SeqCst)
    }

    pub fn is_continuously_reading(&self) -> bool {
        self.inner.control.lock().is_continuous()
    }

    pub fn state(&self) -> ReadLoopState {
        self.inner.control.lock().state()
    }

    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.inner.session.lock().as_ref().map(|s| s.info.clone())
    }

    /// Configuration the current session was opened with.
    pub fn port_configuration(&self) -> Option<PortConfiguration> {
        self.inner.session.lock().as_ref().map(|s| s.config.clone())
    }

    /// Records delivered by the most recently finished read loop.
    pub fn last_batch(&self) -> Vec<String> {
        self.inner.control.lock().last_batch().to_vec()
    }
}

impl std::fmt::Debug for SerialController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialController")
            .field("connection", &self.connection_info())
            .field("control", &*self.inner.control.lock())
            .field("writing", &self.is_writing())
            .finish()
    }
}

/// Wait until `handle` is unlocked and no other task keeps a clone of it.
async fn sole_owner<T>(handle: &Arc<tokio::sync::Mutex<T>>) {
    loop {
        drop(handle.lock().await);
        if Arc::strong_count(handle) == 1 {
            return;
        }
        tokio::task::yield_now().await;
    }
}

/// Wait for the transport's removal signal, then tear the session down and
/// tell the caller. A closed channel means the port was closed normally.
async fn watch_disconnect(
    inner: Weak<ControllerInner>,
    session: u64,
    signal: oneshot::Receiver<String>,
) {
    let Ok(reason) = signal.await else {
        return;
    };
    let Some(inner) = inner.upgrade() else {
        return;
    };

    let controller = SerialController { inner };
    warn!("Device disconnected: {}", reason);
    if controller.teardown(Some(session)).await {
        controller.notify_disconnect(ControllerError::Disconnected(reason));
    }
}
