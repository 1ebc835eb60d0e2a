//! Cancellable read loop and single-record reads.

use super::SerialController;
use crate::error::ControllerError;
use crate::reader::{ReadOutcome, RecordReader};
use crate::state::RecordSink;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// A claimed loop slot, ready to be driven.
pub(super) struct LoopTicket {
    generation: u64,
    token: CancellationToken,
    reader: Arc<tokio::sync::Mutex<RecordReader>>,
}

impl SerialController {
    /// Read records until the stream ends, the loop is cancelled or a read
    /// fails, handing each non-empty record to `on_record` in arrival order.
    ///
    /// Starting this while another loop runs cancels that loop and takes over
    /// the reader once it lets go. Without a connected port this returns at
    /// once.
    ///
    /// Returns the error text when a read failed. The disconnect handler is
    /// told about the failure as well; the session itself stays open.
    pub async fn read_commands<F>(&self, on_record: F) -> Option<String>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let ticket = self.begin_loop(false)?;
        self.drive(ticket, Arc::new(on_record)).await
    }

    /// Keep reading into `on_record`, and re-arm the loop after every
    /// completed write. A no-op (apart from replacing the sink) while a loop
    /// is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn continuously_read<F>(&self, on_record: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let sink: RecordSink = Arc::new(on_record);
        self.inner.control.lock().set_continuous(Arc::clone(&sink));

        match self.begin_loop(true) {
            Some(ticket) => self.spawn_loop(ticket, sink),
            None if self.is_reading() => info!("Continuous read requested while already reading"),
            None => {}
        }
    }

    /// Leave continuous mode: forget the sink and cancel the running loop.
    pub fn cancel_continuous_read(&self) {
        let mut control = self.inner.control.lock();
        control.clear_continuous();
        control.request_cancel();
        debug!("Continuous read cancelled");
    }

    /// Cancel any outstanding loop token and clear the reading flag. Safe to
    /// call at any time, any number of times.
    pub fn unlock(&self) {
        self.inner.control.lock().unlock();
    }

    /// Read one record without starting a loop: a framed record in text mode,
    /// a decoded chunk in raw mode. Goes through the same reader as the loop,
    /// so records stay whole and in order. Never fails: problems come back as
    /// a descriptive string.
    pub async fn read_byte(&self) -> String {
        let Some(reader) = self.reader_handle() else {
            return "error reading data: port is not readable".to_string();
        };
        let Ok(mut reader) = reader.try_lock() else {
            return "error reading data: reader is locked by an active read loop".to_string();
        };

        match reader.read().await {
            Ok(ReadOutcome::Value(record)) => record,
            Ok(ReadOutcome::Done) => "error reading data: stream closed".to_string(),
            Err(e) => format!("error reading data: {e}"),
        }
    }

    /// Called once a write finished: restart reading if continuous mode is on
    /// and no loop is running.
    pub(super) fn on_write_completed(&self) {
        let sink = {
            let control = self.inner.control.lock();
            if !control.is_continuous() {
                return;
            }
            control.sink()
        };
        let Some(sink) = sink else {
            return;
        };
        if let Some(ticket) = self.begin_loop(true) {
            debug!("Re-arming continuous read after write");
            self.spawn_loop(ticket, sink);
        }
    }

    /// Claim the loop slot. With `only_if_idle`, a running loop is left in
    /// place and `None` is returned; otherwise it is superseded.
    fn begin_loop(&self, only_if_idle: bool) -> Option<LoopTicket> {
        let Some(reader) = self.reader_handle() else {
            warn!("Read requested but no readable port is attached");
            return None;
        };
        let mut control = self.inner.control.lock();
        if only_if_idle && control.is_reading() {
            return None;
        }
        let (generation, token) = control.begin();
        Some(LoopTicket {
            generation,
            token,
            reader,
        })
    }

    fn spawn_loop(&self, ticket: LoopTicket, sink: RecordSink) {
        let controller = self.clone();
        tokio::spawn(async move {
            controller.drive(ticket, sink).await;
        });
    }

    async fn drive(&self, ticket: LoopTicket, sink: RecordSink) -> Option<String> {
        let LoopTicket {
            generation,
            token,
            reader,
        } = ticket;

        let mut reader = tokio::select! {
            biased;
            _ = token.cancelled() => {
                self.inner.control.lock().finish(generation, Vec::new());
                return None;
            }
            guard = reader.lock_owned() => guard,
        };
        debug!("Read loop {} started", generation);

        let mut batch = Vec::new();
        let result = loop {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => break Ok(()),
                outcome = reader.read() => outcome,
            };

            match outcome {
                Ok(ReadOutcome::Value(record)) => {
                    if token.is_cancelled() {
                        reader.unread(record);
                        break Ok(());
                    }
                    if record.is_empty() {
                        trace!("Ignoring empty record");
                        continue;
                    }
                    batch.push(record.clone());
                    sink(record);
                }
                Ok(ReadOutcome::Done) => {
                    debug!("Read stream finished");
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };

        drop(reader);
        debug!("Read loop {} ended after {} records", generation, batch.len());
        self.inner.control.lock().finish(generation, batch);

        match result {
            Ok(()) => None,
            Err(e) => {
                let message = format!("error reading data: {e}");
                error!("{}", message);
                self.notify_disconnect(ControllerError::Read(message.clone()));
                Some(message)
            }
        }
    }
}
