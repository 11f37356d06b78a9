//! Worker execution strategies.
//!
//! A [`crate::core::pool::WorkerPool`] does not run task bodies itself; it
//! hands each task to a [`WorkerSlot`], one per worker handle, and waits on
//! the oneshot embedded in the [`SlotJob`]. Two strategies implement the
//! trait, selected per pool by [`crate::config::pool::RuntimeKind`]:
//!
//! - [`thread::ThreadSlot`] — a dedicated OS thread with its own
//!   single-threaded tokio runtime, for CPU-bound work that must not starve
//!   the host's main async runtime.
//! - [`task::TaskSlot`] — a cooperative tokio task, for lightweight or
//!   already-async work where OS threads would be wasteful.
//!
//! Both strategies accept jobs one at a time and report completion the
//! same way, so [`crate::core::pool::WorkerPool`] treats every slot
//! identically regardless of which adapter backs it.

pub mod task;
pub mod thread;

use tokio::sync::oneshot;

use crate::core::executor::{ProgressSink, WorkerExecError};
use crate::core::task::Task;

/// One unit of work handed to a [`WorkerSlot`].
pub struct SlotJob {
    /// The task to execute.
    pub task: Task,
    /// Where to deliver the outcome once `execute` returns.
    pub respond_to: oneshot::Sender<Result<Vec<u8>, WorkerExecError>>,
    /// Handed to the worker body so it can report incremental progress.
    pub progress: ProgressSink,
}

/// A single worker's execution channel, independent of the strategy
/// backing it.
pub trait WorkerSlot: Send + Sync {
    /// Hand a job to this slot. Fails only if the slot has already shut
    /// down; the pool treats that as a crash requiring a restart.
    fn send(&self, job: SlotJob) -> Result<(), SlotClosed>;

    /// Signal the slot to stop accepting jobs and exit once idle.
    fn shutdown(&self);
}

/// The slot's channel has closed (its thread or task exited).
#[derive(Debug, Clone, Copy)]
pub struct SlotClosed;

impl std::fmt::Display for SlotClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker slot channel closed")
    }
}

impl std::error::Error for SlotClosed {}
