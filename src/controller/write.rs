//! Write path.

use super::SerialController;
use crate::error::{ControllerError, ControllerResult};
use crate::port::PortError;
use std::sync::atomic::Ordering;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

impl SerialController {
    /// Send `data` as one buffer and return the number of bytes sent.
    ///
    /// Returns `Ok(None)` when no writable port is attached, so callers can
    /// probe before the session is ready. With `release_lock_after == false`
    /// the writer token stays held after a successful write and later writes
    /// fail with `WriterLocked` until [`release_writer`](Self::release_writer).
    ///
    /// A completed write re-arms the read loop when continuous mode is on.
    ///
    /// # Errors
    ///
    /// - `ControllerError::WriterLocked` if the writer token is held elsewhere
    /// - `ControllerError::Port` if the transport write fails
    pub async fn write(&self, data: &str, release_lock_after: bool) -> ControllerResult<Option<usize>> {
        let Some(writer) = self.writer_handle() else {
            warn!("Write requested but no writable port is attached");
            return Ok(None);
        };
        if self.is_reading() {
            warn!("Writing while a read loop is active");
        }

        let mut writer = writer
            .try_lock_owned()
            .map_err(|_| ControllerError::WriterLocked)?;

        let bytes = data.as_bytes();
        self.inner.writing.store(true, Ordering::SeqCst);
        let result: std::io::Result<()> = async {
            writer.write_all(bytes).await?;
            writer.flush().await
        }
        .await;
        self.inner.writing.store(false, Ordering::SeqCst);
        result.map_err(PortError::from)?;

        debug!("Wrote {} bytes", bytes.len());
        if !release_lock_after {
            *self.inner.held_writer.lock() = Some(writer);
        }
        self.on_write_completed();
        Ok(Some(bytes.len()))
    }

    /// Give back a writer token kept by `write(.., false)`. Returns whether
    /// one was held.
    pub fn release_writer(&self) -> bool {
        self.inner.held_writer.lock().take().is_some()
    }
}
