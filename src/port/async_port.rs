//! Serial transport backed by tokio-serial.
//!
//! Opens a `SerialStream`, splits it into independent read and write halves and
//! watches for the device disappearing from the system port list.

use super::error::PortError;
use super::traits::{LockState, OpenedPort, PortConfiguration, PortInfo, SerialTransport};
use crate::authorization::PortCandidate;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Native async serial port.
pub struct TokioSerialTransport {
    candidate: PortCandidate,
    open: Arc<AtomicBool>,
    /// Cancels the presence watcher spawned by `open`.
    watcher: Option<CancellationToken>,
    presence_poll: Duration,
}

impl TokioSerialTransport {
    /// Wrap an enumerated port. Nothing is opened yet.
    pub fn new(candidate: PortCandidate, presence_poll: Duration) -> Self {
        Self {
            candidate,
            open: Arc::new(AtomicBool::new(false)),
            watcher: None,
            presence_poll,
        }
    }

    /// The enumerated port this transport opens.
    pub fn candidate(&self) -> &PortCandidate {
        &self.candidate
    }
}

#[async_trait]
impl SerialTransport for TokioSerialTransport {
    fn info(&self) -> PortInfo {
        self.candidate.info()
    }

    fn lock_state(&self) -> LockState {
        let open = self.is_open();
        LockState {
            readable_locked: open,
            writable_locked: open,
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn open(&mut self, config: &PortConfiguration) -> Result<OpenedPort, PortError> {
        if self.is_open() {
            return Err(PortError::AlreadyOpen);
        }
        let port_name = self.candidate.port_id.clone();

        let builder = tokio_serial::new(port_name.as_str(), config.baud_rate)
            .data_bits(config.data_bits.into())
            .flow_control(config.flow_control.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .timeout(config.timeout);

        let stream = tokio_serial::SerialStream::open(&builder).map_err(|e| match e.kind {
            tokio_serial::ErrorKind::NoDevice => PortError::not_found(&port_name),
            tokio_serial::ErrorKind::InvalidInput => PortError::config(e.to_string()),
            _ => PortError::other(e.to_string()),
        })?;

        let (reader, writer) = tokio::io::split(stream);
        let (signal_tx, signal_rx) = oneshot::channel();
        let token = CancellationToken::new();
        tokio::spawn(watch_presence(
            port_name.clone(),
            self.presence_poll,
            token.clone(),
            signal_tx,
        ));

        self.watcher = Some(token);
        self.open.store(true, Ordering::SeqCst);
        info!("Opened serial port {} at {} baud", port_name, config.baud_rate);

        Ok(OpenedPort {
            reader: Box::new(reader),
            writer: Box::new(writer),
            disconnected: Some(signal_rx),
        })
    }

    /// Stops the presence watcher. The OS handle itself is released when the
    /// reader and writer halves handed out by `open` are dropped.
    async fn close(&mut self) -> Result<(), PortError> {
        if let Some(token) = self.watcher.take() {
            token.cancel();
        }
        if self.open.swap(false, Ordering::SeqCst) {
            debug!("Closed serial port {}", self.candidate.port_id);
        }
        Ok(())
    }
}

impl std::fmt::Debug for TokioSerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioSerialTransport")
            .field("port", &self.candidate.port_id)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Poll the system port list until `port_name` disappears or the watcher is
/// cancelled. Enumeration failures are treated as "still present".
async fn watch_presence(
    port_name: String,
    interval: Duration,
    token: CancellationToken,
    signal: oneshot::Sender<String>,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        let name = port_name.clone();
        let present = tokio::task::spawn_blocking(move || {
            serialport::available_ports().map(|ports| ports.iter().any(|p| p.port_name == name))
        })
        .await;

        if let Ok(Ok(false)) = present {
            debug!("Serial port {} no longer enumerated", port_name);
            let _ = signal.send(format!("serial port {port_name} was removed"));
            return;
        }
    }
}
