//! In-memory queue with priority and deadline awareness.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::error::SchedulerError;
use crate::core::queue::TaskQueue;
use crate::core::task::Task;
use crate::util::TaskId;

/// Wrapper making a [`Task`] orderable by priority (highest first) and
/// FIFO within priority.
struct PriorityTask(Task);

impl PartialEq for PriorityTask {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for PriorityTask {}

impl PartialOrd for PriorityTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; Priority's Ord has Critical < High < ...,
        // so a task with lower priority value must compare greater here.
        match other.0.priority.cmp(&self.0.priority) {
            Ordering::Equal => other.0.submitted_at_ms.cmp(&self.0.submitted_at_ms),
            ord => ord,
        }
    }
}

/// In-memory queue storing tasks in a priority heap. O(log n) enqueue
/// and dequeue.
pub struct InMemoryQueue {
    max_depth: usize,
    tasks: BinaryHeap<PriorityTask>,
}

impl InMemoryQueue {
    /// Create a new in-memory queue bounded at `max_depth`.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            tasks: BinaryHeap::with_capacity(max_depth.min(1024)),
        }
    }
}

impl TaskQueue for InMemoryQueue {
    fn enqueue(&mut self, task: Task) -> Result<(), SchedulerError> {
        if self.len() >= self.max_depth() {
            return Err(SchedulerError::QueueFull(format!(
                "max queue depth {} reached",
                self.max_depth
            )));
        }
        self.tasks.push(PriorityTask(task));
        Ok(())
    }

    fn dequeue(&mut self) -> Option<Task> {
        self.tasks.pop().map(|pt| pt.0)
    }

    fn prune_expired(&mut self, now_ms: u128) -> Vec<Task> {
        let drained: Vec<_> = self.tasks.drain().collect();
        let (keep, expired): (Vec<_>, Vec<_>) =
            drained.into_iter().partition(|pt| !pt.0.is_expired(now_ms));
        self.tasks = keep.into_iter().collect();
        expired.into_iter().map(|pt| pt.0).collect()
    }

    fn remove(&mut self, id: TaskId) -> Option<Task> {
        let drained: Vec<_> = self.tasks.drain().collect();
        let mut found = None;
        for pt in drained {
            if found.is_none() && pt.0.id == id {
                found = Some(pt.0);
            } else {
                self.tasks.push(pt);
            }
        }
        found
    }

    fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }
}
