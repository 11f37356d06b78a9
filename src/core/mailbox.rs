//! Outcome storage keyed by task id.
//!
//! Distinct from the event stream ([`crate::core::stream`]): the mailbox
//! holds the single terminal [`crate::core::task::TaskOutcome`] for a task
//! so `getTaskStatus`/`awaitTask` callers can retrieve it after the fact,
//! even if they were not listening when the task finished.

use crate::core::error::SchedulerError;
use crate::core::task::TaskOutcome;
use crate::util::TaskId;

/// Pluggable outcome store.
pub trait Mailbox: Send {
    /// Record the terminal outcome for `task`. Overwrites any prior
    /// outcome, which should not happen in practice since task status is
    /// terminal-once-set.
    fn deliver(&mut self, task: TaskId, outcome: TaskOutcome) -> Result<(), SchedulerError>;

    /// Fetch the outcome for `task`, if it has finished.
    fn fetch(&self, task: TaskId) -> Option<TaskOutcome>;

    /// Drop a stored outcome, freeing its slot. Called once a caller has
    /// retrieved a result it does not expect to re-fetch, or by periodic
    /// maintenance for outcomes older than a retention window.
    fn remove(&mut self, task: TaskId) -> Option<TaskOutcome>;
}
