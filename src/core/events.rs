//! Task lifecycle event bus.
//!
//! Distinct from [`crate::core::stream`]'s per-task data streams: these
//! events are lifecycle notifications (`queued`, `started`, `progress`,
//! ...) broadcast to every subscriber — the monitor, external observers,
//! and the dispatcher's own `awaitTask` wait path all listen on the same
//! bus rather than each task getting a private channel.

use tokio::sync::broadcast;

use crate::util::{CapabilityTag, TaskId, WorkerId};

/// Default capacity of the broadcast channel backing an [`EventBus`].
///
/// Lagging subscribers (see [`broadcast::error::RecvError::Lagged`]) drop
/// the oldest events once this many are buffered; the monitor and
/// dispatcher wait paths re-poll task status directly so a lag never
/// strands them.
pub const DEFAULT_CAPACITY: usize = 1024;

/// The distinct lifecycle notifications of spec.md §4.5, in the order
/// `Queued ≺ Started ≺ Progress* ≺ terminal`. `Retry` is a non-terminal
/// notification the dispatcher emits when it re-enqueues a task after a
/// transient failure — a pool only ever sees the retried attempt as a
/// fresh `Queued`/`Started`, not the retry decision itself.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEventKind {
    /// Placed into a pool's queue, or handed straight to an idle worker —
    /// this still fires immediately before `Started` in that case.
    Queued,
    /// Bound to a worker and executing.
    Started,
    /// Worker-reported progress, 0-100.
    Progress(u8),
    /// Re-enqueued after a transient failure. `attempt` is the attempt
    /// about to run.
    Retry {
        /// The attempt about to start, 1-indexed.
        attempt: u32,
    },
    /// Finished successfully.
    Completed,
    /// Finished with a fatal error, or exhausted its retry budget.
    Failed(String),
    /// Exceeded its deadline.
    TimedOut,
    /// Cancelled by the caller.
    Cancelled,
}

impl TaskEventKind {
    /// Whether this is one of the terminal kinds — exactly one fires per
    /// task, per spec.md §8 invariant 5.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_) | Self::TimedOut | Self::Cancelled)
    }
}

/// A lifecycle notification for one task.
#[derive(Debug, Clone)]
pub struct TaskEvent {
    /// Task the event concerns.
    pub task_id: TaskId,
    /// Owning pool.
    pub tag: CapabilityTag,
    /// What happened.
    pub kind: TaskEventKind,
    /// Worker bound at the time of this event, if any.
    pub worker: Option<WorkerId>,
    /// Timestamp in milliseconds since the epoch.
    pub at_ms: u128,
}

/// Broadcast bus for [`TaskEvent`]s, shared by a [`crate::core::manager::UnifiedManager`].
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    /// Create a bus with [`DEFAULT_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with an explicit buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Silently drops it if there are no subscribers,
    /// matching `broadcast::Sender::send`'s semantics.
    pub fn publish(&self, event: TaskEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to future events. Events published before this call are
    /// not delivered.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
