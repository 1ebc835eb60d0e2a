use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Callback receiving each record produced by a read loop.
pub type RecordSink = Arc<dyn Fn(String) + Send + Sync>;

/// Lifecycle of the read loop attached to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadLoopState {
    /// No loop running; one may be started.
    #[default]
    Idle,
    /// A loop holds the reader token and is pulling records.
    Reading,
    /// Cancellation was requested; the loop has not yet unwound.
    Cancelling,
    /// The session was torn down. Only a new `connect` leaves this state.
    Stopped,
}

/// Everything the controller tracks about its read loop, guarded by one lock.
///
/// Each started loop gets a generation number so a superseded loop finishing
/// late cannot reset the state owned by its successor.
#[derive(Default)]
pub struct LoopControl {
    state: ReadLoopState,
    cancel: Option<CancellationToken>,
    generation: u64,
    continuous: bool,
    sink: Option<RecordSink>,
    last_batch: Vec<String>,
}

impl LoopControl {
    pub fn state(&self) -> ReadLoopState {
        self.state
    }

    pub fn is_reading(&self) -> bool {
        matches!(self.state, ReadLoopState::Reading | ReadLoopState::Cancelling)
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    pub fn sink(&self) -> Option<RecordSink> {
        self.sink.clone()
    }

    pub fn last_batch(&self) -> &[String] {
        &self.last_batch
    }

    /// Claim the loop slot: cancel whichever loop currently holds it, move to
    /// `Reading` and hand out a fresh generation and cancellation token.
    pub fn begin(&mut self) -> (u64, CancellationToken) {
        if let Some(previous) = self.cancel.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        self.generation += 1;
        self.state = ReadLoopState::Reading;
        self.cancel = Some(token.clone());
        (self.generation, token)
    }

    /// Record the end of loop `generation`. Ignored when a newer loop has
    /// since claimed the slot or the session was stopped.
    pub fn finish(&mut self, generation: u64, batch: Vec<String>) {
        if generation != self.generation {
            return;
        }
        self.last_batch = batch;
        self.cancel = None;
        if self.state != ReadLoopState::Stopped {
            self.state = ReadLoopState::Idle;
        }
    }

    /// Request cancellation of the running loop, if any.
    pub fn request_cancel(&mut self) {
        if let Some(token) = &self.cancel {
            token.cancel();
            if self.state == ReadLoopState::Reading {
                self.state = ReadLoopState::Cancelling;
            }
        }
    }

    /// Cancel any outstanding token and clear the reading flag. Safe to call
    /// at any time, any number of times.
    pub fn unlock(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        if self.state != ReadLoopState::Stopped {
            self.state = ReadLoopState::Idle;
        }
    }

    pub fn set_continuous(&mut self, sink: RecordSink) {
        self.continuous = true;
        self.sink = Some(sink);
    }

    pub fn clear_continuous(&mut self) {
        self.continuous = false;
        self.sink = None;
    }

    /// Session teardown: cancel, forget the continuous sink and park in `Stopped`.
    pub fn stop(&mut self) {
        self.unlock();
        self.clear_continuous();
        self.state = ReadLoopState::Stopped;
    }

    /// Fresh session: back to `Idle`.
    pub fn reset(&mut self) {
        self.unlock();
        self.clear_continuous();
        self.state = ReadLoopState::Idle;
    }
}

impl std::fmt::Debug for LoopControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopControl")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("continuous", &self.continuous)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
