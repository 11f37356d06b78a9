//! Pluggable per-pool queue backend.

use crate::core::error::SchedulerError;
use crate::core::task::Task;

/// A priority- and deadline-aware queue feeding a single [`crate::core::pool::WorkerPool`].
///
/// Implementations need not be thread-safe on their own; the pool holds
/// its queue behind its own lock (see `SPEC_FULL.md`'s CONCURRENCY
/// section) and never calls a queue method re-entrantly.
pub trait TaskQueue: Send {
    /// Insert `task`, failing if `max_depth` would be exceeded.
    fn enqueue(&mut self, task: Task) -> Result<(), SchedulerError>;

    /// Remove and return the highest-priority, oldest-within-priority task.
    fn dequeue(&mut self) -> Option<Task>;

    /// Remove all tasks whose deadline has already passed as of `now_ms`,
    /// returning how many were dropped.
    fn prune_expired(&mut self, now_ms: u128) -> Vec<Task>;

    /// Remove a specific queued task by id, for explicit cancellation
    /// before it was ever dispatched. Returns it if it was present.
    fn remove(&mut self, id: crate::util::TaskId) -> Option<Task>;

    /// Configured maximum depth.
    fn max_depth(&self) -> usize;

    /// Current number of queued tasks.
    fn len(&self) -> usize;

    /// Whether the queue holds no tasks.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
