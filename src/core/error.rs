//! Error taxonomy for scheduler components.

use thiserror::Error;

use crate::util::{CapabilityTag, StreamId, TaskId, WorkerId};

/// Errors produced by scheduler components.
///
/// Errors are either retried by the dispatcher (transient: [`Self::WorkerCrash`],
/// [`Self::Timeout`], retryable [`Self::WorkerError`]) or surfaced immediately
/// (everything else). See [`SchedulerError::is_retryable`].
#[derive(Debug, Error, Clone)]
pub enum SchedulerError {
    /// No pool is registered for the requested operation.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Task submitted after the owning manager began shutting down.
    #[error("pool is shutting down")]
    PoolShuttingDown,

    /// Queue is full for the target pool.
    #[error("queue full: {0}")]
    QueueFull(String),

    /// Task would exceed configured worker-count capacity.
    #[error("capacity exceeded")]
    CapacityExceeded,

    /// Task deadline has passed before it could be admitted.
    #[error("deadline expired")]
    DeadlineExpired,

    /// Worker exited before returning a terminal message.
    #[error("worker {worker} crashed while running task {task}")]
    WorkerCrash {
        /// Worker that crashed.
        worker: WorkerId,
        /// Task it was running.
        task: TaskId,
    },

    /// Task exceeded its configured deadline while running.
    #[error("task {0} timed out")]
    Timeout(TaskId),

    /// Worker explicitly reported a failure for the task.
    #[error("worker error: {message}")]
    WorkerError {
        /// Message reported by the worker.
        message: String,
        /// Whether the worker tagged this error as safe to retry.
        retryable: bool,
    },

    /// Task was cancelled by the caller; never retried.
    #[error("task {0} was cancelled")]
    Cancelled(TaskId),

    /// A stream message referenced an unknown stream id or violated the
    /// stream's state machine.
    #[error("stream protocol violation on {0}")]
    StreamProtocolViolation(StreamId),

    /// A second source tried to register for a capability tag already in
    /// active use with a different worker source.
    #[error("pool already active for tag: {0}")]
    PoolAlreadyActive(CapabilityTag),

    /// Backend-specific failure with context (unwired persistence stubs,
    /// adapter spawn failures, etc).
    #[error("backend error: {0}")]
    Backend(String),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SchedulerError {
    /// Whether the dispatcher should retry a task that failed with this
    /// error, subject to the task's remaining attempt budget.
    ///
    /// Per spec.md §9's Open Question: the wire protocol carries a
    /// `retryable` hint on worker-reported errors; everything else follows
    /// a fixed policy (crashes and timeouts are transient, cancellation and
    /// protocol/config errors are not).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::WorkerCrash { .. } | Self::Timeout(_) => true,
            Self::WorkerError { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

/// Application-facing result alias for code embedding this crate.
///
/// Internal crate APIs return `Result<T, SchedulerError>`; this alias is for
/// callers composing the crate's errors with their own via `anyhow`.
pub type AppResult<T> = Result<T, anyhow::Error>;
