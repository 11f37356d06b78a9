//! Worker handle and lifecycle status.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{now_ms, CapabilityTag, TaskId, WorkerId};

/// Lifecycle state of a single worker, per spec.md §4.1.
///
/// `Spawning -> Idle <-> Busy -> Restarting -> Idle` is the steady-state
/// cycle; `Terminated` is absorbing and only reached from `evict_idle` or
/// `terminate_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerStatus {
    /// Adapter spawn has been requested but not yet confirmed ready.
    Spawning,
    /// Ready and waiting for a task.
    Idle,
    /// Executing a bound task.
    Busy,
    /// Hosting an active [`crate::core::stream::EventStream`] for its
    /// lifetime; excluded from one-shot dispatch until released.
    Streaming,
    /// Crashed or evicted and being respawned in place.
    Restarting,
    /// Permanently stopped; the slot will be removed from the pool.
    Terminated,
}

/// Rolling performance counters maintained by [`crate::core::monitor::WorkerMonitor`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WorkerStats {
    /// Tasks completed successfully.
    pub completed: u64,
    /// Tasks that ended in failure, timeout, or crash.
    pub failed: u64,
    /// Exponential moving average of task processing time, in milliseconds.
    pub avg_process_time_ms: f64,
    /// Timestamp of the last state transition.
    pub last_transition_ms: u128,
}

impl WorkerStats {
    /// Smoothing factor for the processing-time EMA. Chosen so roughly
    /// the last 10 tasks dominate the average.
    const EMA_ALPHA: f64 = 0.2;

    /// Fold in one task's outcome and duration.
    pub fn record(&mut self, succeeded: bool, duration: Duration) {
        if succeeded {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        let sample = duration.as_secs_f64() * 1000.0;
        self.avg_process_time_ms = if self.completed + self.failed == 1 {
            sample
        } else {
            Self::EMA_ALPHA.mul_add(sample, (1.0 - Self::EMA_ALPHA) * self.avg_process_time_ms)
        };
    }
}

/// A worker slot tracked by a [`crate::core::pool::WorkerPool`].
///
/// The pool owns the channel or task handle needed to actually reach the
/// worker; this struct is the bookkeeping half visible to monitoring and
/// the dispatcher.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    /// Stable identifier.
    pub id: WorkerId,
    /// Capability tag of the owning pool.
    pub tag: CapabilityTag,
    /// Current lifecycle status.
    pub status: WorkerStatus,
    /// Task currently bound to this worker, if `Busy`.
    pub current_task: Option<TaskId>,
    /// Number of times this slot has been restarted after a crash.
    pub restart_count: u32,
    /// Rolling performance counters.
    pub stats: WorkerStats,
    /// Timestamp this worker last went idle, used by the pool's idle-eviction
    /// sweep.
    pub idle_since_ms: Option<u128>,
}

impl WorkerHandle {
    /// Construct a new handle in the `Spawning` state.
    #[must_use]
    pub fn new(tag: CapabilityTag) -> Self {
        Self {
            id: WorkerId::new(),
            tag,
            status: WorkerStatus::Spawning,
            current_task: None,
            restart_count: 0,
            stats: WorkerStats::default(),
            idle_since_ms: None,
        }
    }

    /// Transition to `Idle`, clearing any bound task and stamping the
    /// idle-since marker the eviction sweep reads.
    pub fn mark_idle(&mut self) {
        self.status = WorkerStatus::Idle;
        self.current_task = None;
        self.idle_since_ms = Some(now_ms());
        self.stats.last_transition_ms = now_ms();
    }

    /// Transition to `Busy`, binding `task`.
    pub fn mark_busy(&mut self, task: TaskId) {
        self.status = WorkerStatus::Busy;
        self.current_task = Some(task);
        self.idle_since_ms = None;
        self.stats.last_transition_ms = now_ms();
    }

    /// Transition to `Streaming`: bound to a stream rather than a one-shot
    /// task, so it is not a candidate for idle eviction or task dispatch.
    pub fn mark_streaming(&mut self) {
        self.status = WorkerStatus::Streaming;
        self.current_task = None;
        self.idle_since_ms = None;
        self.stats.last_transition_ms = now_ms();
    }

    /// Whether this worker has been idle for at least `idle_timeout`.
    #[must_use]
    pub fn idle_expired(&self, idle_timeout: Duration, now_ms: u128) -> bool {
        self.status == WorkerStatus::Idle
            && self
                .idle_since_ms
                .is_some_and(|since| now_ms.saturating_sub(since) >= idle_timeout.as_millis())
    }
}
