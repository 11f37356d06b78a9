//! `TaskDispatcher`: the external submission surface, and the only place
//! that implements retry/backoff and timeout enforcement.
//!
//! A [`crate::core::pool::WorkerPool`] runs exactly one attempt per
//! `submit` call and does not know about retry policy; the dispatcher owns
//! the loop that resubmits a task to its pool after a retryable failure,
//! counts attempts against [`crate::core::task::RetryPolicy::max_attempts`],
//! and arms/disarms the per-attempt timeout with `tokio::time::timeout`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::core::error::SchedulerError;
use crate::core::events::{TaskEvent, TaskEventKind};
use crate::core::factory::PoolFactory;
use crate::core::task::{Priority, RetryPolicy, Task, TaskOutcome, TaskStatus};
use crate::util::{now_ms, CapabilityTag, TaskId};
use crate::Mutex;

/// Per-submission overrides. Fields left at their [`Default`] defer to the
/// owning pool's configuration (for `timeout`) or a fixed baseline
/// (`priority`, `retry`).
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    /// Scheduling priority.
    pub priority: Priority,
    /// Per-attempt timeout. `None` uses the pool's `default_timeout`.
    pub timeout: Option<Duration>,
    /// Retry budget.
    pub retry: RetryPolicy,
    /// Explicit capability-tag override — spec.md §6's `workerType?`. When
    /// set, routing bypasses [`crate::core::factory::PoolFactory::resolve_tag`]
    /// entirely and goes straight to this tag's pool.
    pub worker_type: Option<CapabilityTag>,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            priority: Priority::default(),
            timeout: None,
            retry: RetryPolicy::default(),
            worker_type: None,
        }
    }
}

struct Tracked {
    tag: CapabilityTag,
    status: TaskStatus,
}

/// Owns the retry/timeout loop and the terminal-outcome store external
/// callers observe through [`TaskDispatcher::await_task`] and
/// [`TaskDispatcher::get_task_status`].
pub struct TaskDispatcher {
    factory: Arc<PoolFactory>,
    tracked: Mutex<HashMap<TaskId, Tracked>>,
    finals: Mutex<HashMap<TaskId, TaskOutcome>>,
    waiters: Mutex<HashMap<TaskId, Vec<oneshot::Sender<TaskOutcome>>>>,
}

impl TaskDispatcher {
    /// Build a dispatcher over `factory`.
    #[must_use]
    pub fn new(factory: Arc<PoolFactory>) -> Arc<Self> {
        Arc::new(Self {
            factory,
            tracked: Mutex::new(HashMap::new()),
            finals: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
        })
    }

    /// Submit a task, returning its id immediately. The task runs (and
    /// retries, and times out) in the background; use [`Self::await_task`]
    /// or [`Self::get_task_status`] to observe it.
    ///
    /// Per spec.md §4.5 dispatch step 1, the pool is chosen by
    /// `opts.worker_type` when set, otherwise by resolving `operation`
    /// through [`crate::core::factory::PoolFactory::resolve_tag`] (an
    /// explicit `registerTaskType` mapping, or the factory's default tag).
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownOperation`] if `operation` resolves to no
    /// tag (no override, no mapping, no default) or to a tag with no
    /// registered worker source, or if `operation` is outside that source's
    /// declared operation set; propagates pool construction errors
    /// otherwise.
    pub fn submit_task(
        self: &Arc<Self>,
        operation: impl Into<String>,
        payload: Vec<u8>,
        opts: SubmitOptions,
    ) -> Result<TaskId, SchedulerError> {
        let operation = operation.into();
        let tag = match &opts.worker_type {
            Some(tag) => tag.clone(),
            None => self.factory.resolve_tag(&operation)?,
        };
        self.factory.check_operation(&tag, &operation)?;
        let pool = self.factory.get_pool(&tag)?;

        let timeout = opts.timeout.unwrap_or_else(|| pool.default_timeout());
        let deadline_ms = now_ms() + timeout.as_millis();
        let task = Task::new(tag.clone(), operation, payload, opts.priority, Some(deadline_ms), opts.retry);
        let id = task.id;

        self.tracked.lock().insert(id, Tracked { tag, status: TaskStatus::Queued });

        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            dispatcher.run_with_retry(pool, task, timeout).await;
        });

        Ok(id)
    }

    async fn run_with_retry(
        self: Arc<Self>,
        pool: Arc<crate::core::pool::WorkerPool>,
        mut task: Task,
        timeout: Duration,
    ) {
        loop {
            task.attempt += 1;
            let rx = pool.await_outcome(task.id);
            let outcome = if let Err(err) = pool.submit(task.clone()) {
                TaskOutcome::Failed { message: err.to_string(), retryable: err.is_retryable() }
            } else {
                self.set_status(task.id, TaskStatus::Running);
                match tokio::time::timeout(timeout, rx).await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(_)) => TaskOutcome::Failed {
                        message: "pool dropped without reporting an outcome".into(),
                        retryable: false,
                    },
                    Err(_elapsed) => {
                        debug!(task = %task.id, "task timed out, disarming wait");
                        if let Err(err) = pool.restart_worker_for_task(task.id) {
                            debug!(task = %task.id, error = %err, "no worker to restart after timeout");
                        }
                        TaskOutcome::TimedOut
                    }
                }
            };

            if outcome.is_retryable() && task.attempts_remaining() {
                let delay = task.retry.backoff_for(task.attempt);
                warn!(task = %task.id, attempt = task.attempt, delay_ms = delay.as_millis(), "retrying task");
                self.factory.events().publish(TaskEvent {
                    task_id: task.id,
                    tag: task.tag.clone(),
                    kind: TaskEventKind::Retry { attempt: task.attempt + 1 },
                    worker: None,
                    at_ms: now_ms(),
                });
                tokio::time::sleep(delay).await;
                continue;
            }

            self.finalize(task.id, outcome);
            return;
        }
    }

    fn set_status(&self, id: TaskId, status: TaskStatus) {
        if let Some(t) = self.tracked.lock().get_mut(&id) {
            t.status = status;
        }
    }

    fn finalize(&self, id: TaskId, outcome: TaskOutcome) {
        self.set_status(id, outcome.status());
        self.finals.lock().insert(id, outcome.clone());
        if let Some(senders) = self.waiters.lock().remove(&id) {
            for tx in senders {
                let _ = tx.send(outcome.clone());
            }
        }
    }

    /// Wait for `task`'s terminal outcome.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Backend`] if `task` was never submitted through
    /// this dispatcher.
    pub async fn await_task(&self, task: TaskId) -> Result<TaskOutcome, SchedulerError> {
        if let Some(outcome) = self.finals.lock().get(&task).cloned() {
            return Ok(outcome);
        }
        if !self.tracked.lock().contains_key(&task) {
            return Err(SchedulerError::Backend(format!("unknown task {task}")));
        }

        let (tx, rx) = oneshot::channel();
        self.waiters.lock().entry(task).or_default().push(tx);

        // Re-check: the task may have finalized between the lookup above
        // and registering the waiter.
        if let Some(outcome) = self.finals.lock().get(&task).cloned() {
            return Ok(outcome);
        }

        rx.await.map_err(|_| SchedulerError::Backend("dispatcher dropped without finalizing task".into()))
    }

    /// Current status of `task`, if it was submitted through this
    /// dispatcher.
    #[must_use]
    pub fn get_task_status(&self, task: TaskId) -> Option<TaskStatus> {
        if let Some(outcome) = self.finals.lock().get(&task) {
            return Some(outcome.status());
        }
        self.tracked.lock().get(&task).map(|t| t.status.clone())
    }

    /// Cancel `task` if it is still queued. Tasks already running cannot be
    /// interrupted — see [`crate::core::pool::WorkerPool::cancel_queued`].
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Backend`] if `task` was never submitted through
    /// this dispatcher, or its pool is no longer registered.
    pub fn cancel(&self, task: TaskId) -> Result<bool, SchedulerError> {
        let tag = {
            let tracked = self.tracked.lock();
            tracked
                .get(&task)
                .map(|t| t.tag.clone())
                .ok_or_else(|| SchedulerError::Backend(format!("unknown task {task}")))?
        };
        let pool = self.factory.get_pool(&tag)?;
        let cancelled = pool.cancel_queued(task)?;
        if cancelled {
            self.finalize(task, TaskOutcome::Cancelled);
        }
        Ok(cancelled)
    }

    /// Shared factory, for composing with [`crate::core::monitor::WorkerMonitor`]
    /// and [`crate::core::manager::UnifiedManager`].
    #[must_use]
    pub fn factory(&self) -> &Arc<PoolFactory> {
        &self.factory
    }
}
