//! Record-level reader over an opened port.
//!
//! In text mode every transport chunk is pushed through a [`LineFramer`] and
//! complete records are handed out one at a time. In raw mode each chunk is
//! decoded and returned unsplit.

use crate::framer::LineFramer;
use crate::port::{PortError, PortReader};
use std::collections::VecDeque;
use tokio::io::AsyncReadExt;
use tracing::trace;

/// Result of one read from a [`RecordReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A record (text mode) or a decoded chunk (raw mode). May be empty.
    Value(String),
    /// The far end closed the stream; every later read returns `Done` too.
    Done,
}

/// Pulls records off a port's read half.
///
/// `read` is cancel safe: the only suspension point is the transport read,
/// and nothing is buffered until that read has completed.
pub struct RecordReader {
    inner: PortReader,
    framer: Option<LineFramer>,
    ready: VecDeque<String>,
    buffer: Vec<u8>,
    finished: bool,
}

impl RecordReader {
    /// Hand out decoded transport chunks without splitting them.
    pub fn raw(inner: PortReader, buffer_size: usize) -> Self {
        Self::build(inner, None, buffer_size)
    }

    /// Hand out delimiter-framed records.
    pub fn framed(inner: PortReader, framer: LineFramer, buffer_size: usize) -> Self {
        Self::build(inner, Some(framer), buffer_size)
    }

    fn build(inner: PortReader, framer: Option<LineFramer>, buffer_size: usize) -> Self {
        Self {
            inner,
            framer,
            ready: VecDeque::new(),
            buffer: vec![0u8; buffer_size.max(1)],
            finished: false,
        }
    }

    pub fn is_framed(&self) -> bool {
        self.framer.is_some()
    }

    /// Next record. On end of stream a framed reader first yields the framer's
    /// remainder (possibly empty), then `Done`.
    pub async fn read(&mut self) -> Result<ReadOutcome, PortError> {
        loop {
            if let Some(record) = self.ready.pop_front() {
                return Ok(ReadOutcome::Value(record));
            }
            if self.finished {
                return Ok(ReadOutcome::Done);
            }

            let n = self.inner.read(&mut self.buffer).await?;
            if n == 0 {
                self.finished = true;
                if let Some(framer) = self.framer.as_mut() {
                    return Ok(ReadOutcome::Value(framer.flush()));
                }
                return Ok(ReadOutcome::Done);
            }
            trace!("read {} bytes from port", n);

            match self.framer.as_mut() {
                Some(framer) => self.ready.extend(framer.transform(&self.buffer[..n])),
                None => {
                    return Ok(ReadOutcome::Value(
                        String::from_utf8_lossy(&self.buffer[..n]).into_owned(),
                    ))
                }
            }
        }
    }

    /// Put a record back at the front of the queue so the next `read`
    /// returns it again.
    pub fn unread(&mut self, record: String) {
        self.ready.push_front(record);
    }
}

impl std::fmt::Debug for RecordReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordReader")
            .field("framed", &self.is_framed())
            .field("ready", &self.ready.len())
            .field("finished", &self.finished)
            .finish()
    }
}
