//! In-memory outcome store.

use std::collections::HashMap;

use crate::core::error::SchedulerError;
use crate::core::mailbox::Mailbox;
use crate::core::task::TaskOutcome;
use crate::util::TaskId;

/// Simple in-memory mailbox for development/testing and the default
/// runtime configuration.
#[derive(Default)]
pub struct InMemoryMailbox {
    outcomes: HashMap<TaskId, TaskOutcome>,
}

impl InMemoryMailbox {
    /// Create an empty mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Mailbox for InMemoryMailbox {
    fn deliver(&mut self, task: TaskId, outcome: TaskOutcome) -> Result<(), SchedulerError> {
        self.outcomes.insert(task, outcome);
        Ok(())
    }

    fn fetch(&self, task: TaskId) -> Option<TaskOutcome> {
        self.outcomes.get(&task).cloned()
    }

    fn remove(&mut self, task: TaskId) -> Option<TaskOutcome> {
        self.outcomes.remove(&task)
    }
}
