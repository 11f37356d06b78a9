//! `WorkerPool`: the set of workers serving one capability tag.
//!
//! Concurrency model: all mutable pool state lives behind a single
//! [`parking_lot::Mutex`] (re-exported as [`crate::Mutex`]); every method
//! below takes that lock, does a constant-ish amount of bookkeeping, and
//! releases it before doing anything that could block or await. This
//! mirrors `SPEC_FULL.md`'s "single-threaded cooperative coordinator"
//! guarantee without literally running on one thread: two callers can
//! never observe the pool mid-transition. The one exception is dispatching
//! a job to a worker slot, which is itself a non-blocking channel send.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::adapter::task::TaskSlot;
use crate::adapter::thread::ThreadSlot;
use crate::adapter::{SlotJob, WorkerSlot};
use crate::config::pool::{PoolConfig, RuntimeKind};
use crate::core::audit::{build_audit_event, AuditSink};
use crate::core::error::SchedulerError;
use crate::core::events::{EventBus, TaskEvent, TaskEventKind};
use crate::core::executor::{DynWorkerExecutor, ProgressSink};
use crate::core::mailbox::Mailbox;
use crate::core::queue::TaskQueue;
use crate::core::stream::StreamManager;
use crate::core::task::{Task, TaskOutcome, TaskStatus};
use crate::core::worker::{WorkerHandle, WorkerStatus};
use crate::util::{now_ms, TaskId, WorkerId};
use crate::Mutex;

/// Point-in-time snapshot of a pool's composition, for `getPoolTypes`-style
/// introspection and the monitor.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    /// Tag this pool serves.
    pub tag: crate::util::CapabilityTag,
    /// Worker count by status.
    pub worker_count: usize,
    pub idle_count: usize,
    pub busy_count: usize,
    /// Queue depth.
    pub queued: usize,
    /// Whether `terminate_all` has been called.
    pub shutting_down: bool,
}

struct PoolState {
    config: PoolConfig,
    queue: Box<dyn TaskQueue>,
    workers: HashMap<WorkerId, WorkerHandle>,
    slots: HashMap<WorkerId, Box<dyn WorkerSlot>>,
    idle: VecDeque<WorkerId>,
    streaming: std::collections::HashSet<WorkerId>,
    shutting_down: bool,
}

impl PoolState {
    fn idle_count(&self) -> usize {
        self.workers.values().filter(|w| w.status == WorkerStatus::Idle).count()
    }

    fn busy_count(&self) -> usize {
        self.workers.values().filter(|w| w.status == WorkerStatus::Busy).count()
    }
}

/// The set of workers serving one capability tag, plus the queue feeding
/// them and the outcome store they report into.
pub struct WorkerPool {
    tag: crate::util::CapabilityTag,
    state: Mutex<PoolState>,
    executor: DynWorkerExecutor,
    mailbox: Mutex<Box<dyn Mailbox>>,
    events: EventBus,
    audit: Option<Arc<Mutex<Box<dyn AuditSink>>>>,
    waiters: Mutex<HashMap<TaskId, Vec<oneshot::Sender<TaskOutcome>>>>,
    streams: Option<Arc<StreamManager>>,
}

impl WorkerPool {
    /// Build a pool and spawn its initial `min_workers` slots.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if `config` fails
    /// validation.
    pub fn new(
        config: PoolConfig,
        executor: DynWorkerExecutor,
        queue: Box<dyn TaskQueue>,
        mailbox: Box<dyn Mailbox>,
        events: EventBus,
        audit: Option<Arc<Mutex<Box<dyn AuditSink>>>>,
        streams: Option<Arc<StreamManager>>,
    ) -> Result<Arc<Self>, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let tag = config.tag.clone();
        let pool = Arc::new(Self {
            tag: tag.clone(),
            state: Mutex::new(PoolState {
                config,
                queue,
                workers: HashMap::new(),
                slots: HashMap::new(),
                idle: VecDeque::new(),
                streaming: std::collections::HashSet::new(),
                shutting_down: false,
            }),
            executor,
            mailbox: Mutex::new(mailbox),
            events,
            audit,
            waiters: Mutex::new(HashMap::new()),
            streams,
        });

        let min_workers = pool.state.lock().config.min_workers;
        for _ in 0..min_workers {
            pool.spawn_worker();
        }

        info!(tag = %tag, min_workers, "pool initialized");
        Ok(pool)
    }

    /// The capability tag this pool serves.
    #[must_use]
    pub fn tag(&self) -> &crate::util::CapabilityTag {
        &self.tag
    }

    /// The default task timeout configured for this pool.
    #[must_use]
    pub fn default_timeout(&self) -> std::time::Duration {
        self.state.lock().config.default_timeout
    }

    /// The worker source bound to this pool, for code (the manager's
    /// stream-command bridge) that needs to drive it directly rather than
    /// through a one-shot task dispatch.
    #[must_use]
    pub fn executor(&self) -> &DynWorkerExecutor {
        &self.executor
    }

    fn spawn_worker(self: &Arc<Self>) -> WorkerId {
        let mut state = self.state.lock();
        let handle = WorkerHandle::new(self.tag.clone());
        let id = handle.id;
        let slot: Box<dyn WorkerSlot> = match state.config.runtime {
            RuntimeKind::Thread => Box::new(ThreadSlot::spawn(id, Arc::clone(&self.executor), None)),
            RuntimeKind::Task => Box::new(TaskSlot::spawn(id, Arc::clone(&self.executor))),
        };
        state.slots.insert(id, slot);
        let mut handle = handle;
        handle.mark_idle();
        state.workers.insert(id, handle);
        state.idle.push_back(id);
        debug!(worker = %id, tag = %self.tag, "worker spawned");
        id
    }

    /// Enqueue a task, assigning it to an idle worker (spawning one if the
    /// pool has spare capacity) or leaving it queued otherwise.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::PoolShuttingDown`] once [`Self::terminate_all`] has
    /// been called; [`SchedulerError::QueueFull`] if the queue is at
    /// capacity and no worker is immediately available.
    pub fn submit(self: &Arc<Self>, mut task: Task) -> Result<(), SchedulerError> {
        {
            let state = self.state.lock();
            if state.shutting_down {
                return Err(SchedulerError::PoolShuttingDown);
            }
        }

        self.record_audit(&task, "submit", None);
        self.publish(&task, TaskEventKind::Queued, None);

        self.try_assign_or_enqueue(&mut task)?;
        Ok(())
    }

    /// Attempt to hand `task` straight to an idle worker, spawning a new
    /// one if under `max_workers`; otherwise enqueue it. Returns whether it
    /// was assigned immediately.
    fn try_assign_or_enqueue(self: &Arc<Self>, task: &mut Task) -> Result<bool, SchedulerError> {
        let worker_id = {
            let mut state = self.state.lock();
            if let Some(id) = state.idle.pop_front() {
                Some(id)
            } else if state.workers.len() < state.config.max_workers {
                drop(state);
                let id = self.spawn_worker();
                let mut state = self.state.lock();
                state.idle.retain(|w| *w != id);
                Some(id)
            } else {
                None
            }
        };

        if let Some(worker_id) = worker_id {
            self.dispatch_to(worker_id, task.clone())?;
            return Ok(true);
        }

        let mut state = self.state.lock();
        state.queue.enqueue(task.clone())?;
        Ok(false)
    }

    fn dispatch_to(self: &Arc<Self>, worker_id: WorkerId, mut task: Task) -> Result<(), SchedulerError> {
        task.status = TaskStatus::Running;
        task.bound_worker = Some(worker_id);

        let (tx, rx) = oneshot::channel();
        let (progress, mut progress_rx) = ProgressSink::new();
        let job = SlotJob { task: task.clone(), respond_to: tx, progress };

        {
            let mut state = self.state.lock();
            let Some(slot) = state.slots.get(&worker_id) else {
                return Err(SchedulerError::Backend(format!("unknown worker {worker_id}")));
            };
            if slot.send(job).is_err() {
                state.workers.remove(&worker_id);
                state.slots.remove(&worker_id);
                return Err(SchedulerError::WorkerCrash { worker: worker_id, task: task.id });
            }
            if let Some(handle) = state.workers.get_mut(&worker_id) {
                handle.mark_busy(task.id);
            }
        }

        self.record_audit(&task, "dispatch", None);
        self.publish(&task, TaskEventKind::Started, Some(worker_id));

        {
            let pool = Arc::clone(self);
            let task_for_progress = task.clone();
            tokio::spawn(async move {
                while let Some(percent) = progress_rx.recv().await {
                    pool.publish(&task_for_progress, TaskEventKind::Progress(percent), Some(worker_id));
                }
            });
        }

        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = match rx.await {
                Ok(Ok(payload)) => TaskOutcome::Completed(payload),
                Ok(Err(err)) => TaskOutcome::Failed { message: err.message, retryable: err.retryable },
                Err(_) => TaskOutcome::Failed {
                    message: format!("worker {worker_id} crashed"),
                    retryable: true,
                },
            };
            pool.handle_worker_message(worker_id, task, outcome);
        });

        Ok(())
    }

    /// Called once a worker slot finishes (or crashes on) a task.
    fn handle_worker_message(self: &Arc<Self>, worker_id: WorkerId, task: Task, outcome: TaskOutcome) {
        let status = outcome.status();
        self.record_audit(&task, audit_action_for(&status), detail_for(&outcome));

        {
            let mut state = self.state.lock();
            if let Some(handle) = state.workers.get_mut(&worker_id) {
                handle.mark_idle();
                handle.stats.record(
                    matches!(status, TaskStatus::Completed),
                    std::time::Duration::from_millis(
                        now_ms().saturating_sub(task.submitted_at_ms) as u64,
                    ),
                );
                state.idle.push_back(worker_id);
            }
        }

        let _ = self.mailbox.lock().deliver(task.id, outcome.clone());
        self.notify_waiters(task.id, outcome.clone());
        self.publish(&task, event_kind_for(&outcome), None);

        self.try_drain_queue();
    }

    fn try_drain_queue(self: &Arc<Self>) {
        let next = {
            let mut state = self.state.lock();
            if state.shutting_down {
                return;
            }
            if state.idle.is_empty() {
                return;
            }
            state.queue.dequeue()
        };
        if let Some(task) = next {
            let mut task = task;
            let _ = self.try_assign_or_enqueue(&mut task);
        }
    }

    /// Reserve an idle worker (spawning a fresh one if under `max_workers`)
    /// to host a [`crate::core::stream::EventStream`] for its lifetime,
    /// excluding it from one-shot dispatch until [`Self::release_stream_worker`].
    ///
    /// # Errors
    ///
    /// [`SchedulerError::PoolShuttingDown`] once [`Self::terminate_all`] has
    /// run; [`SchedulerError::CapacityExceeded`] if every worker is busy and
    /// the pool is already at `max_workers`.
    pub fn reserve_worker_for_stream(self: &Arc<Self>) -> Result<WorkerId, SchedulerError> {
        let worker_id = {
            let mut state = self.state.lock();
            if state.shutting_down {
                return Err(SchedulerError::PoolShuttingDown);
            }
            if let Some(id) = state.idle.pop_front() {
                Some(id)
            } else if state.workers.len() < state.config.max_workers {
                drop(state);
                let id = self.spawn_worker();
                let mut state = self.state.lock();
                state.idle.retain(|w| *w != id);
                Some(id)
            } else {
                None
            }
        };

        let worker_id = worker_id.ok_or(SchedulerError::CapacityExceeded)?;
        let mut state = self.state.lock();
        if let Some(handle) = state.workers.get_mut(&worker_id) {
            handle.mark_streaming();
        }
        state.streaming.insert(worker_id);
        Ok(worker_id)
    }

    /// Release a worker reserved by [`Self::reserve_worker_for_stream`] back
    /// to the idle pool once its stream has closed, and trigger a
    /// scheduling pass for anything that queued up meanwhile.
    pub fn release_stream_worker(self: &Arc<Self>, worker_id: WorkerId) {
        {
            let mut state = self.state.lock();
            if !state.streaming.remove(&worker_id) {
                return;
            }
            if let Some(handle) = state.workers.get_mut(&worker_id) {
                handle.mark_idle();
                state.idle.push_back(worker_id);
            }
        }
        self.try_drain_queue();
    }

    /// Register a waiter for `task`'s terminal outcome, returning it
    /// immediately if the mailbox already has it.
    pub fn await_outcome(&self, task: TaskId) -> oneshot::Receiver<TaskOutcome> {
        let (tx, rx) = oneshot::channel();
        if let Some(outcome) = self.mailbox.lock().fetch(task) {
            let _ = tx.send(outcome);
        } else {
            self.waiters.lock().entry(task).or_default().push(tx);
        }
        rx
    }

    fn notify_waiters(&self, task: TaskId, outcome: TaskOutcome) {
        if let Some(senders) = self.waiters.lock().remove(&task) {
            for tx in senders {
                let _ = tx.send(outcome.clone());
            }
        }
    }

    /// Remove queued tasks whose deadline has already passed, reporting
    /// each as [`TaskStatus::TimedOut`].
    pub fn prune_expired_queue(&self) {
        let expired = self.state.lock().queue.prune_expired(now_ms());
        for task in expired {
            self.record_audit(&task, "timeout", None);
            self.notify_waiters(task.id, TaskOutcome::TimedOut);
            self.publish(&task, TaskEventKind::TimedOut, None);
        }
    }

    /// Remove idle workers that have exceeded `idle_timeout`, never
    /// dropping below `min_workers`.
    pub fn evict_idle(&self) {
        let now = now_ms();
        let mut state = self.state.lock();
        let min_workers = state.config.min_workers;
        let idle_timeout = state.config.idle_timeout;

        let candidates: Vec<WorkerId> = state
            .workers
            .iter()
            .filter(|(_, w)| w.idle_expired(idle_timeout, now))
            .map(|(id, _)| *id)
            .collect();

        for id in candidates {
            if state.workers.len() <= min_workers {
                break;
            }
            state.workers.remove(&id);
            state.slots.remove(&id);
            state.idle.retain(|w| *w != id);
            debug!(worker = %id, tag = %self.tag, "worker evicted after idle timeout");
        }
    }

    /// Replace this pool's configuration. Takes effect for future
    /// spawns/evictions; existing workers above a lowered `max_workers`
    /// are reclaimed by the next `evict_idle` sweep rather than killed
    /// mid-task.
    pub fn update_config(&self, config: PoolConfig) -> Result<(), SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        self.state.lock().config = config;
        Ok(())
    }

    /// Forcibly restart one worker: drop its slot (aborting an in-flight
    /// task, if any) and spawn a fresh one in its place. The task being run,
    /// if any, is treated as crashed and left to the dispatcher's retry
    /// policy.
    pub fn restart_worker(self: &Arc<Self>, worker_id: WorkerId) -> Result<(), SchedulerError> {
        let (current_task, was_streaming) = {
            let mut state = self.state.lock();
            let Some(handle) = state.workers.get_mut(&worker_id) else {
                return Err(SchedulerError::Backend(format!("unknown worker {worker_id}")));
            };
            handle.status = WorkerStatus::Restarting;
            handle.restart_count += 1;
            let task = handle.current_task;
            state.idle.retain(|w| *w != worker_id);
            let was_streaming = state.streaming.remove(&worker_id);
            if let Some(slot) = state.slots.remove(&worker_id) {
                slot.shutdown();
            }
            (task, was_streaming)
        };

        // Streams are not migratable: a worker hosting one that crashes or
        // is force-restarted ends the stream rather than waiting for the
        // replacement slot to come up.
        if was_streaming {
            if let Some(streams) = &self.streams {
                streams.handle_worker_termination(worker_id);
            }
        }

        let new_slot: Box<dyn WorkerSlot> = {
            let state = self.state.lock();
            match state.config.runtime {
                RuntimeKind::Thread => {
                    Box::new(ThreadSlot::spawn(worker_id, Arc::clone(&self.executor), None))
                }
                RuntimeKind::Task => Box::new(TaskSlot::spawn(worker_id, Arc::clone(&self.executor))),
            }
        };

        {
            let mut state = self.state.lock();
            state.slots.insert(worker_id, new_slot);
            if let Some(handle) = state.workers.get_mut(&worker_id) {
                handle.mark_idle();
            }
            state.idle.push_back(worker_id);
        }

        warn!(worker = %worker_id, tag = %self.tag, ?current_task, "worker restarted");
        self.try_drain_queue();
        Ok(())
    }

    /// Stop accepting new tasks and tear down every worker slot. Queued
    /// tasks are drained and reported as cancelled.
    pub fn terminate_all(self: &Arc<Self>) {
        let (drained, streaming) = {
            let mut state = self.state.lock();
            state.shutting_down = true;
            for slot in state.slots.values() {
                slot.shutdown();
            }
            state.slots.clear();
            state.workers.clear();
            state.idle.clear();
            let streaming: Vec<WorkerId> = state.streaming.drain().collect();
            let mut drained = Vec::new();
            while let Some(task) = state.queue.dequeue() {
                drained.push(task);
            }
            (drained, streaming)
        };

        if let Some(streams) = &self.streams {
            for worker_id in streaming {
                streams.handle_worker_termination(worker_id);
            }
        }

        for task in drained {
            self.record_audit(&task, "cancel", Some("pool terminated".into()));
            self.notify_waiters(task.id, TaskOutcome::Cancelled);
            self.publish(&task, TaskEventKind::Cancelled, None);
        }

        info!(tag = %self.tag, "pool terminated");
    }

    /// Cancel a specific task: if still queued, remove it; if running,
    /// nothing short of `restart_worker` can interrupt it (the worker body
    /// does not poll for cancellation), so this only guarantees queued
    /// cancellation.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Cancelled`] is never returned as an error; `Ok(true)`
    /// indicates the task was queued and removed, `Ok(false)` that it was
    /// not found in the queue (already running, finished, or unknown).
    pub fn cancel_queued(&self, task_id: TaskId) -> Result<bool, SchedulerError> {
        let removed = self.state.lock().queue.remove(task_id);
        if let Some(task) = removed {
            self.notify_waiters(task_id, TaskOutcome::Cancelled);
            self.publish(&task, TaskEventKind::Cancelled, None);
            self.record_audit(&task, "cancel", None);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// A point-in-time snapshot of this pool's composition.
    #[must_use]
    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.state.lock();
        PoolSnapshot {
            tag: self.tag.clone(),
            worker_count: state.workers.len(),
            idle_count: state.idle_count(),
            busy_count: state.busy_count(),
            queued: state.queue.len(),
            shutting_down: state.shutting_down,
        }
    }

    /// Worker handles, for the monitor's per-worker stats reporting.
    #[must_use]
    pub fn worker_handles(&self) -> Vec<WorkerHandle> {
        self.state.lock().workers.values().cloned().collect()
    }

    fn publish(&self, task: &Task, kind: TaskEventKind, worker: Option<WorkerId>) {
        self.events.publish(TaskEvent {
            task_id: task.id,
            tag: self.tag.clone(),
            kind,
            worker,
            at_ms: now_ms(),
        });
    }

    /// Restart whichever worker is currently bound to `task_id`, if any is
    /// still running it. Used by [`crate::core::dispatcher::TaskDispatcher`]
    /// after a per-attempt timeout — the task itself is left to the
    /// dispatcher's retry policy; this only replaces the worker slot.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Backend`] if no worker is currently bound to
    /// `task_id` (it may have already finished, or never started).
    pub fn restart_worker_for_task(self: &Arc<Self>, task_id: TaskId) -> Result<(), SchedulerError> {
        let worker_id = {
            let state = self.state.lock();
            state
                .workers
                .iter()
                .find(|(_, handle)| handle.current_task == Some(task_id))
                .map(|(id, _)| *id)
        };
        let worker_id =
            worker_id.ok_or_else(|| SchedulerError::Backend(format!("no worker bound to task {task_id}")))?;
        self.restart_worker(worker_id)
    }

    fn record_audit(&self, task: &Task, action: &str, detail: Option<String>) {
        if let Some(sink) = &self.audit {
            let event = build_audit_event(task.id, self.tag.clone(), action, detail);
            sink.lock().record(event);
        }
    }
}

fn event_kind_for(outcome: &TaskOutcome) -> TaskEventKind {
    match outcome {
        TaskOutcome::Completed(_) => TaskEventKind::Completed,
        TaskOutcome::Failed { message, .. } => TaskEventKind::Failed(message.clone()),
        TaskOutcome::TimedOut => TaskEventKind::TimedOut,
        TaskOutcome::Cancelled => TaskEventKind::Cancelled,
    }
}

fn audit_action_for(status: &TaskStatus) -> &'static str {
    match status {
        TaskStatus::Completed => "complete",
        TaskStatus::Failed(_) => "fail",
        TaskStatus::TimedOut => "timeout",
        TaskStatus::Cancelled => "cancel",
        TaskStatus::Queued | TaskStatus::Running => "dispatch",
    }
}

fn detail_for(outcome: &TaskOutcome) -> Option<String> {
    match outcome {
        TaskOutcome::Failed { message, .. } => Some(message.clone()),
        _ => None,
    }
}
