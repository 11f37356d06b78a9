//! Task data model: priority, status, retry policy, and the task itself.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{now_ms, CapabilityTag, TaskId, WorkerId};

/// Scheduling priority. Lower numeric value dequeues first.
///
/// `Ord` is derived in declaration order, so `Critical < High < Normal <
/// Low < Background` holds directly — a [`std::collections::BinaryHeap`]
/// (a max-heap) over `Reverse<Priority>` yields highest-priority-first,
/// which is exactly how [`crate::infra::queue::memory::InMemoryQueue`]
/// uses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Must run before anything else.
    Critical = 0,
    /// Above normal urgency.
    High = 1,
    /// Default priority.
    Normal = 2,
    /// Below normal urgency.
    Low = 3,
    /// Runs only when nothing else is queued.
    Background = 4,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Retry budget for transient failures: max attempts and exponential
/// backoff parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Base delay before the first retry.
    pub backoff_base: Duration,
    /// Upper bound on the computed backoff delay.
    pub backoff_ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_base: Duration::from_millis(100),
            backoff_ceiling: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the `attempt`th retry (1-indexed: `attempt=1` is the
    /// delay before the second overall try), per spec.md §4.5:
    /// `base × 2^(attempt−1)`, capped at `backoff_ceiling`.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let scaled = self.backoff_base.saturating_mul(1u32 << exp);
        scaled.min(self.backoff_ceiling)
    }
}

/// Current lifecycle status of a task.
///
/// Transitions are monotonic except for the explicit `Running -> Queued`
/// retry edge; all other states are absorbing. See spec.md §4.8.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Waiting in a pool's queue.
    Queued,
    /// Bound to a worker and executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with a fatal error or exhausted retries.
    Failed(String),
    /// Exceeded its deadline while running.
    TimedOut,
    /// Cancelled by the caller.
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal (no further transitions occur).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }
}

/// The outcome delivered to callers awaiting a task, or stored in the
/// mailbox for later retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskOutcome {
    /// Task completed successfully with an opaque result payload.
    Completed(Vec<u8>),
    /// Task failed. `retryable` carries the worker's own hint (or the
    /// fixed policy for crashes/timeouts) to the dispatcher's retry loop;
    /// it does not survive into the rendered [`TaskStatus::Failed`].
    Failed {
        /// Rendered error message.
        message: String,
        /// Whether the dispatcher may retry the owning task.
        retryable: bool,
    },
    /// Task timed out.
    TimedOut,
    /// Task was cancelled.
    Cancelled,
}

impl TaskOutcome {
    /// The [`TaskStatus`] this outcome corresponds to.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Completed(_) => TaskStatus::Completed,
            Self::Failed { message, .. } => TaskStatus::Failed(message.clone()),
            Self::TimedOut => TaskStatus::TimedOut,
            Self::Cancelled => TaskStatus::Cancelled,
        }
    }

    /// Whether the dispatcher's retry policy permits retrying the task
    /// that produced this outcome.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TimedOut) || matches!(self, Self::Failed { retryable: true, .. })
    }
}

/// A unit of work submitted to a [`crate::core::dispatcher::TaskDispatcher`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier.
    pub id: TaskId,
    /// Capability tag selecting which pool handles this task.
    pub tag: CapabilityTag,
    /// Operation name, dispatched by the worker body.
    pub operation: String,
    /// Opaque payload.
    pub payload: Vec<u8>,
    /// Scheduling priority.
    pub priority: Priority,
    /// Optional wall-clock deadline in milliseconds since the epoch.
    pub deadline_ms: Option<u128>,
    /// Retry budget governing transient-failure recovery.
    pub retry: RetryPolicy,
    /// Submission timestamp in milliseconds since the epoch.
    pub submitted_at_ms: u128,
    /// Attempts made so far (1 once running for the first time).
    pub attempt: u32,
    /// Current status.
    pub status: TaskStatus,
    /// Worker currently bound to this task, if running.
    pub bound_worker: Option<WorkerId>,
}

impl Task {
    /// Construct a new task in the `Queued` state with `attempt = 0`.
    #[must_use]
    pub fn new(
        tag: CapabilityTag,
        operation: impl Into<String>,
        payload: Vec<u8>,
        priority: Priority,
        deadline_ms: Option<u128>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            id: TaskId::new(),
            tag,
            operation: operation.into(),
            payload,
            priority,
            deadline_ms,
            retry,
            submitted_at_ms: now_ms(),
            attempt: 0,
            status: TaskStatus::Queued,
            bound_worker: None,
        }
    }

    /// Whether the deadline, if any, has already passed.
    #[must_use]
    pub fn is_expired(&self, now_ms: u128) -> bool {
        self.deadline_ms.is_some_and(|d| now_ms > d)
    }

    /// Whether another attempt is permitted by the retry budget.
    #[must_use]
    pub fn attempts_remaining(&self) -> bool {
        self.attempt < self.retry.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_critical_first() {
        let mut priorities = [Priority::Low, Priority::Critical, Priority::Normal, Priority::High, Priority::Background];
        priorities.sort();
        assert_eq!(
            priorities,
            [Priority::Critical, Priority::High, Priority::Normal, Priority::Low, Priority::Background]
        );
    }

    #[test]
    fn backoff_doubles_per_attempt_and_caps_at_ceiling() {
        let policy = RetryPolicy {
            max_attempts: 10,
            backoff_base: Duration::from_millis(50),
            backoff_ceiling: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(50));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(5), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(20), Duration::from_millis(500));
    }

    #[test]
    fn terminal_statuses_are_distinguished_from_in_flight() {
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed("boom".into()).is_terminal());
        assert!(TaskStatus::TimedOut.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn only_timeout_and_tagged_failures_are_retryable() {
        assert!(TaskOutcome::TimedOut.is_retryable());
        assert!(TaskOutcome::Failed { message: "flaky".into(), retryable: true }.is_retryable());
        assert!(!TaskOutcome::Failed { message: "fatal".into(), retryable: false }.is_retryable());
        assert!(!TaskOutcome::Completed(Vec::new()).is_retryable());
        assert!(!TaskOutcome::Cancelled.is_retryable());
    }

    #[test]
    fn attempts_remaining_respects_max_attempts() {
        let mut task = Task::new(
            CapabilityTag::new("calc"),
            "add",
            Vec::new(),
            Priority::Normal,
            None,
            RetryPolicy { max_attempts: 2, ..RetryPolicy::default() },
        );
        assert!(task.attempts_remaining());
        task.attempt = 2;
        assert!(!task.attempts_remaining());
    }

    #[test]
    fn expiry_is_strictly_after_the_deadline() {
        let mut task = Task::new(CapabilityTag::new("calc"), "add", Vec::new(), Priority::Normal, None, RetryPolicy::default());
        task.deadline_ms = Some(1000);
        assert!(!task.is_expired(1000));
        assert!(task.is_expired(1001));
    }
}
