//! `StreamManager`/`EventStream`: long-lived, worker-bound data streams.
//!
//! Distinct from [`crate::core::events::EventBus`]'s lifecycle
//! broadcasts: a stream is opened against one specific worker (typically
//! because a task's worker source wants to emit incremental progress or
//! partial output) and stays bound to that worker for its entire
//! lifetime — per spec.md's design note, a stream is never reassigned to
//! a different worker even if the original one restarts. A worker crash
//! ends the stream with [`StreamEvent::Error`] rather than silently
//! resuming elsewhere.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::error::SchedulerError;
use crate::util::{StreamId, WorkerId};

/// Lifecycle state of a stream, per spec.md §4.6/§4.8's state machine:
/// `Initializing -> Active <-> Paused -> Closed`, with any state able to
/// fall to `Error` on protocol violation or worker loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Opened but not yet acknowledged ready by the worker side.
    Initializing,
    /// Ready and flowing in both directions.
    Active,
    /// Flowing but back-pressured; a hint only, data may still arrive.
    Paused,
    /// Ended cleanly; absorbing.
    Closed,
    /// Ended by protocol violation or worker loss; absorbing.
    Error,
}

impl StreamStatus {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Error)
    }
}

/// A message carried on an [`EventStream`], matching spec.md §4.6's
/// `ready|message|error|close|pause|resume` event set.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The stream was opened and is ready to receive data. Fires exactly
    /// once, before any `Message`.
    Ready,
    /// A chunk of opaque data.
    Message(Vec<u8>),
    /// Back-pressure hint from the other side; data may still follow.
    Pause,
    /// Cancels a prior `Pause` hint.
    Resume,
    /// The worker reported an error; the stream transitions to `Error` and
    /// a `Closed` event follows immediately (spec.md §7: terminal but does
    /// not by itself kill the worker).
    Error(String),
    /// The stream has ended; no further events will arrive. Fires exactly
    /// once no matter which side or how many times `close` was called.
    Closed,
}

struct StreamEntry {
    worker: WorkerId,
    tx: mpsc::Sender<StreamEvent>,
    closed: Arc<AtomicBool>,
    status: Arc<crate::Mutex<StreamStatus>>,
    inbound_rx: crate::Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
}

/// Producer handle for a stream, held by whatever is feeding it data (a
/// worker body, or code acting on its behalf).
///
/// `closed` is shared with the [`StreamManager`]'s registry entry so that
/// [`StreamManager::close`] and [`Self::close`] agree on whether `Closed`
/// has already been sent — per spec.md §4.6's invariant, exactly one
/// `Closed` event reaches the consumer no matter which side calls close,
/// or how many times.
#[derive(Clone)]
pub struct StreamHandle {
    id: StreamId,
    worker: WorkerId,
    tx: mpsc::Sender<StreamEvent>,
    closed: Arc<AtomicBool>,
    status: Arc<crate::Mutex<StreamStatus>>,
}

impl StreamHandle {
    /// The stream this handle feeds.
    #[must_use]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Acknowledge the stream ready, transitioning it to `Active`. Idempotent
    /// past the first call: later calls are no-ops, preserving "ready fires
    /// exactly once".
    pub fn mark_ready(&self) {
        let mut status = self.status.lock();
        if *status != StreamStatus::Initializing {
            return;
        }
        *status = StreamStatus::Active;
        drop(status);
        let _ = self.tx.try_send(StreamEvent::Ready);
    }

    /// Push a data chunk.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::StreamProtocolViolation`] if the stream has been
    /// closed, or its consumer has already dropped its [`EventStream`].
    pub fn send_data(&self, data: Vec<u8>) -> Result<(), SchedulerError> {
        self.send(StreamEvent::Message(data))
    }

    /// Signal a back-pressure pause. A hint only; the other side may keep
    /// sending.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::StreamProtocolViolation`] if the stream is closed.
    pub fn pause(&self) -> Result<(), SchedulerError> {
        {
            let mut status = self.status.lock();
            if status.is_terminal() {
                return Err(SchedulerError::StreamProtocolViolation(self.id));
            }
            *status = StreamStatus::Paused;
        }
        self.send(StreamEvent::Pause)
    }

    /// Cancel a prior [`Self::pause`].
    ///
    /// # Errors
    ///
    /// [`SchedulerError::StreamProtocolViolation`] if the stream is closed.
    pub fn resume(&self) -> Result<(), SchedulerError> {
        {
            let mut status = self.status.lock();
            if status.is_terminal() {
                return Err(SchedulerError::StreamProtocolViolation(self.id));
            }
            *status = StreamStatus::Active;
        }
        self.send(StreamEvent::Resume)
    }

    /// Report a worker-side error, ending the stream with [`StreamStatus::Error`]
    /// followed immediately by exactly one `Closed` event.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::StreamProtocolViolation`] if the stream has already
    /// closed.
    pub fn send_error(&self, message: impl Into<String>) -> Result<(), SchedulerError> {
        let message = message.into();
        self.send(StreamEvent::Error(message))?;
        *self.status.lock() = StreamStatus::Error;
        self.close();
        Ok(())
    }

    fn send(&self, event: StreamEvent) -> Result<(), SchedulerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::StreamProtocolViolation(self.id));
        }
        self.tx.try_send(event).map_err(|_| SchedulerError::StreamProtocolViolation(self.id))
    }

    /// End the stream. Idempotent: only the first call (from whichever
    /// side — this handle or [`StreamManager::close`]) emits the single
    /// `Closed` event the consumer sees.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut status = self.status.lock();
        if !status.is_terminal() {
            *status = StreamStatus::Closed;
        }
        drop(status);
        let _ = self.tx.try_send(StreamEvent::Closed);
    }

    /// The worker this stream is bound to.
    #[must_use]
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> StreamStatus {
        *self.status.lock()
    }
}

/// Consumer handle for a stream.
pub struct EventStream {
    id: StreamId,
    worker: WorkerId,
    rx: mpsc::Receiver<StreamEvent>,
    status: Arc<crate::Mutex<StreamStatus>>,
    inbound_tx: mpsc::Sender<Vec<u8>>,
}

impl EventStream {
    /// The stream's identifier.
    #[must_use]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// The worker this stream is bound to for its entire lifetime.
    #[must_use]
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Current lifecycle status — spec.md §4.6's `getStatus()`.
    #[must_use]
    pub fn status(&self) -> StreamStatus {
        *self.status.lock()
    }

    /// Receive the next event, or `None` once the stream has closed and
    /// drained.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Send a command/data chunk to the worker hosting this stream —
    /// spec.md §4.6's bidirectional `STREAM_MESSAGE` (either direction).
    /// Whatever drives the worker side reads these through
    /// [`StreamManager::take_inbound`].
    ///
    /// # Errors
    ///
    /// [`SchedulerError::StreamProtocolViolation`] once the stream has
    /// closed or nothing is reading the inbound side any more.
    pub fn send(&self, data: Vec<u8>) -> Result<(), SchedulerError> {
        self.inbound_tx.try_send(data).map_err(|_| SchedulerError::StreamProtocolViolation(self.id))
    }
}

/// Default buffered capacity for a stream's channel.
const STREAM_BUFFER: usize = 256;

/// Registry of live streams, each bound to the worker it was opened
/// against.
#[derive(Default)]
pub struct StreamManager {
    streams: crate::Mutex<HashMap<StreamId, StreamEntry>>,
}

impl StreamManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new stream bound to `worker` (spec.md §4.6's `createStream`;
    /// the worker is chosen by the caller — typically the one a task is
    /// already bound to — and fixed for the stream's lifetime). Starts in
    /// `Initializing`; the producer side calls [`StreamHandle::mark_ready`]
    /// once the worker has acknowledged `STREAM_READY`.
    #[must_use]
    pub fn open(&self, worker: WorkerId) -> (StreamHandle, EventStream) {
        let id = StreamId::new();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel(STREAM_BUFFER);
        let closed = Arc::new(AtomicBool::new(false));
        let status = Arc::new(crate::Mutex::new(StreamStatus::Initializing));
        self.streams.lock().insert(
            id,
            StreamEntry {
                worker,
                tx: tx.clone(),
                closed: Arc::clone(&closed),
                status: Arc::clone(&status),
                inbound_rx: crate::Mutex::new(Some(inbound_rx)),
            },
        );
        (
            StreamHandle { id, worker, tx, closed, status: Arc::clone(&status) },
            EventStream { id, worker, rx, status, inbound_tx },
        )
    }

    /// Take ownership of `id`'s inbound command channel — the receiving
    /// half of [`EventStream::send`]. Returns `None` on a second call or an
    /// unknown id: exactly one reader drives a stream's worker side.
    #[must_use]
    pub fn take_inbound(&self, id: StreamId) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.streams.lock().get(&id)?.inbound_rx.lock().take()
    }

    /// Close and forget `id`. Idempotent with [`StreamHandle::close`]: the
    /// consumer still sees exactly one `Closed` event regardless of which
    /// side calls close first.
    pub fn close(&self, id: StreamId) {
        if let Some(entry) = self.streams.lock().remove(&id) {
            if !entry.closed.swap(true, Ordering::AcqRel) {
                let mut status = entry.status.lock();
                if !status.is_terminal() {
                    *status = StreamStatus::Closed;
                }
                drop(status);
                let _ = entry.tx.try_send(StreamEvent::Closed);
            }
        }
    }

    /// Close every open stream — spec.md §4.6's `closeAll()`, run during
    /// manager shutdown.
    pub fn close_all(&self) {
        let ids: Vec<StreamId> = self.streams.lock().keys().copied().collect();
        for id in ids {
            self.close(id);
        }
    }

    /// End, with [`StreamStatus::Error`], every stream bound to `worker` —
    /// spec.md §4.6's `handleWorkerTermination`: streams are not
    /// migratable, so losing their worker is always terminal for them.
    pub fn handle_worker_termination(&self, worker: WorkerId) {
        let ids: Vec<StreamId> = self
            .streams
            .lock()
            .iter()
            .filter(|(_, entry)| entry.worker == worker)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            if let Some(entry) = self.streams.lock().get(&id) {
                if !entry.closed.swap(true, Ordering::AcqRel) {
                    *entry.status.lock() = StreamStatus::Error;
                    let _ = entry.tx.try_send(StreamEvent::Error("worker terminated".into()));
                    let _ = entry.tx.try_send(StreamEvent::Closed);
                }
            }
            self.streams.lock().remove(&id);
        }
    }

    /// The worker `id` is bound to, if it is still open.
    #[must_use]
    pub fn worker_for(&self, id: StreamId) -> Option<WorkerId> {
        self.streams.lock().get(&id).map(|entry| entry.worker)
    }

    /// Number of currently open streams — spec.md §4.6's `getStreamCount()`.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.streams.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::WorkerId;

    #[tokio::test]
    async fn ready_fires_exactly_once_before_any_message() {
        let manager = StreamManager::new();
        let worker = WorkerId::new();
        let (handle, mut stream) = manager.open(worker);
        handle.mark_ready();
        handle.mark_ready(); // no-op, already active
        handle.send_data(b"hello".to_vec()).expect("send data");

        assert!(matches!(stream.recv().await, Some(StreamEvent::Ready)));
        assert!(matches!(stream.recv().await, Some(StreamEvent::Message(d)) if d == b"hello"));
        assert_eq!(stream.status(), StreamStatus::Active);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_emits_exactly_one_closed_event() {
        let manager = StreamManager::new();
        let worker = WorkerId::new();
        let (handle, mut stream) = manager.open(worker);

        handle.close();
        handle.close();
        manager.close(handle.id());

        assert!(matches!(stream.recv().await, Some(StreamEvent::Closed)));
        assert!(stream.recv().await.is_none());
        assert_eq!(stream.status(), StreamStatus::Closed);
    }

    #[tokio::test]
    async fn send_after_close_rejects() {
        let manager = StreamManager::new();
        let worker = WorkerId::new();
        let (handle, _stream) = manager.open(worker);

        handle.close();
        let result = handle.send_data(b"too late".to_vec());
        assert!(matches!(result, Err(SchedulerError::StreamProtocolViolation(id)) if id == handle.id()));
    }

    #[tokio::test]
    async fn manager_close_is_idempotent_with_handle_close() {
        let manager = StreamManager::new();
        let worker = WorkerId::new();
        let (handle, mut stream) = manager.open(worker);

        manager.close(handle.id());
        handle.close();

        assert!(matches!(stream.recv().await, Some(StreamEvent::Closed)));
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn pause_and_resume_are_hints_that_do_not_close_the_stream() {
        let manager = StreamManager::new();
        let worker = WorkerId::new();
        let (handle, mut stream) = manager.open(worker);
        handle.mark_ready();

        handle.pause().expect("pause");
        handle.resume().expect("resume");

        assert!(matches!(stream.recv().await, Some(StreamEvent::Ready)));
        assert!(matches!(stream.recv().await, Some(StreamEvent::Pause)));
        assert!(matches!(stream.recv().await, Some(StreamEvent::Resume)));
        assert_eq!(stream.status(), StreamStatus::Active);
    }

    #[tokio::test]
    async fn worker_loss_errors_every_stream_bound_to_it_but_not_others() {
        let manager = StreamManager::new();
        let lost_worker = WorkerId::new();
        let other_worker = WorkerId::new();
        let (_lost_handle, mut lost_stream) = manager.open(lost_worker);
        let (_other_handle, _other_stream) = manager.open(other_worker);

        manager.handle_worker_termination(lost_worker);

        assert!(matches!(lost_stream.recv().await, Some(StreamEvent::Error(_))));
        assert!(matches!(lost_stream.recv().await, Some(StreamEvent::Closed)));
        assert_eq!(manager.open_count(), 1);
    }

    #[test]
    fn open_count_reflects_live_streams() {
        let manager = StreamManager::new();
        let worker = WorkerId::new();
        assert_eq!(manager.open_count(), 0);
        let (handle, _stream) = manager.open(worker);
        assert_eq!(manager.open_count(), 1);
        manager.close(handle.id());
        assert_eq!(manager.open_count(), 0);
    }

    #[tokio::test]
    async fn inbound_commands_reach_whoever_calls_take_inbound_exactly_once() {
        let manager = StreamManager::new();
        let worker = WorkerId::new();
        let (_handle, stream) = manager.open(worker);

        let mut inbound = manager.take_inbound(stream.id()).expect("first take succeeds");
        assert!(manager.take_inbound(stream.id()).is_none());

        stream.send(b"increment".to_vec()).expect("send command");
        assert_eq!(inbound.recv().await, Some(b"increment".to_vec()));
    }

    #[test]
    fn close_all_closes_every_stream() {
        let manager = StreamManager::new();
        let _a = manager.open(WorkerId::new());
        let _b = manager.open(WorkerId::new());
        assert_eq!(manager.open_count(), 2);
        manager.close_all();
        assert_eq!(manager.open_count(), 0);
    }
}
