//! `WorkerMonitor`: periodic metrics sampling, a bounded log ring, and
//! threshold-based alerting.
//!
//! The log ring reuses [`crate::core::audit::InMemoryAuditSink`]'s bounded
//! `VecDeque` pattern; alert delivery reuses [`crate::core::events::EventBus`]'s
//! broadcast-channel pattern, here carrying [`MonitorEvent`] instead of
//! [`crate::core::task::TaskStatus`] transitions.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use crate::core::factory::PoolFactory;
use crate::util::{now_ms, CapabilityTag, TaskId, WorkerId};
use crate::Mutex;

/// A metric [`AlertRule`] watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Number of tasks waiting in a pool's queue.
    QueueDepth,
    /// Fraction of completed tasks (in the sampling window) that failed,
    /// timed out, or crashed, in `[0.0, 1.0]`.
    FailureRate,
    /// Fraction of workers currently `Busy`, in `[0.0, 1.0]`.
    Utilization,
    /// Mean of each worker's processing-time EMA, in milliseconds.
    AverageProcessTime,
}

/// Direction a threshold is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Alert fires when the sampled value is greater than the threshold.
    GreaterThan,
    /// Alert fires when the sampled value is less than the threshold.
    LessThan,
}

/// A single threshold rule evaluated against every sample.
#[derive(Debug, Clone)]
pub struct AlertRule {
    /// Human-readable name, surfaced on the fired [`MonitorEvent`].
    pub name: String,
    /// Pool this rule watches. `None` matches every pool.
    pub tag: Option<CapabilityTag>,
    /// Metric the rule watches.
    pub metric: MetricKind,
    /// Threshold to compare against.
    pub threshold: f64,
    /// Comparison direction.
    pub comparison: Comparison,
}

impl AlertRule {
    fn matches_tag(&self, tag: &CapabilityTag) -> bool {
        self.tag.as_ref().is_none_or(|t| t == tag)
    }

    fn fires(&self, value: f64) -> bool {
        match self.comparison {
            Comparison::GreaterThan => value > self.threshold,
            Comparison::LessThan => value < self.threshold,
        }
    }
}

/// A point-in-time metrics sample for one pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSample {
    /// Pool this sample describes.
    pub tag: CapabilityTag,
    /// Timestamp in milliseconds since the epoch.
    pub at_ms: u128,
    /// Total worker count.
    pub worker_count: usize,
    /// Idle worker count.
    pub idle_count: usize,
    /// Busy worker count.
    pub busy_count: usize,
    /// Tasks waiting in the queue.
    pub queued: usize,
    /// Mean of each worker's processing-time EMA, in milliseconds.
    pub avg_process_time_ms: f64,
    /// Fraction of completed+failed tasks (across all workers, all time)
    /// that were failures.
    pub failure_rate: f64,
}

/// Severity of a [`LogEntry`], per spec.md §3's log-entry data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Fine-grained diagnostic detail.
    Debug,
    /// Routine lifecycle notices.
    Info,
    /// Recoverable anomalies worth a human's attention.
    Warn,
    /// Failures.
    Error,
}

/// One entry in the monitor's bounded log ring.
///
/// `workerType`/`workerId`/`taskId` in spec.md §3 become
/// `tag`/`worker`/`task` here, matching this crate's naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was recorded, in milliseconds since the epoch.
    pub at_ms: u128,
    /// Severity.
    pub level: LogLevel,
    /// Free-form message.
    pub message: String,
    /// Capability tag of the pool the entry concerns, if any.
    pub tag: Option<CapabilityTag>,
    /// Worker the entry concerns, if any.
    pub worker: Option<WorkerId>,
    /// Task the entry concerns, if any.
    pub task: Option<TaskId>,
}

/// What got pushed into the monitor's sample/alert log and broadcast to
/// subscribers. Distinct from [`LogEntry`]: this is metrics telemetry, not
/// the free-form log ring `get_logs` filters over.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// A routine sample.
    Sample(MetricsSample),
    /// An [`AlertRule`] fired.
    Alert {
        /// The rule that fired.
        rule: String,
        /// Pool the alert concerns.
        tag: CapabilityTag,
        /// The value that tripped the rule.
        value: f64,
        /// Timestamp in milliseconds since the epoch.
        at_ms: u128,
    },
    /// `autoRestart` is enabled and a worker is suspected wedged or
    /// repeatedly failing; the embedder (or an [`super::connector::ExtensionConnector`])
    /// is expected to call [`crate::core::pool::WorkerPool::restart_worker`].
    WorkerNeedsRestart {
        /// Pool the worker belongs to.
        tag: CapabilityTag,
        /// The suspect worker.
        worker: WorkerId,
        /// Timestamp in milliseconds since the epoch.
        at_ms: u128,
    },
}

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Samples every registered pool on a timer, retains a bounded log of
/// samples/alerts and a separate bounded free-form log ring, and
/// broadcasts both to subscribers.
pub struct WorkerMonitor {
    factory: Arc<PoolFactory>,
    rules: Mutex<Vec<AlertRule>>,
    sample_log: Mutex<VecDeque<MonitorEvent>>,
    sample_log_capacity: usize,
    logs: Mutex<VecDeque<LogEntry>>,
    max_log_entries: AtomicUsize,
    min_log_level: Mutex<LogLevel>,
    auto_restart: AtomicBool,
    tx: broadcast::Sender<MonitorEvent>,
}

impl WorkerMonitor {
    /// Build a monitor over `factory`'s pools, retaining at most
    /// `log_capacity` entries in both the sample/alert log and the
    /// free-form log ring.
    #[must_use]
    pub fn new(factory: Arc<PoolFactory>, log_capacity: usize) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Arc::new(Self {
            factory,
            rules: Mutex::new(Vec::new()),
            sample_log: Mutex::new(VecDeque::with_capacity(log_capacity.min(4096))),
            sample_log_capacity: log_capacity,
            logs: Mutex::new(VecDeque::with_capacity(log_capacity.min(4096))),
            max_log_entries: AtomicUsize::new(log_capacity),
            min_log_level: Mutex::new(LogLevel::Info),
            auto_restart: AtomicBool::new(false),
            tx,
        })
    }

    /// Register a threshold rule.
    pub fn add_rule(&self, rule: AlertRule) {
        self.rules.lock().push(rule);
    }

    /// Subscribe to sample and alert events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    /// Snapshot of the retained sample/alert log, oldest first.
    #[must_use]
    pub fn log(&self) -> Vec<MonitorEvent> {
        self.sample_log.lock().iter().cloned().collect()
    }

    /// Append a free-form log entry, dropping it silently if `level` is
    /// below [`Self::set_log_level`]'s current floor.
    pub fn record_log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        tag: Option<CapabilityTag>,
        worker: Option<WorkerId>,
        task: Option<TaskId>,
    ) {
        if level < *self.min_log_level.lock() {
            return;
        }
        let entry = LogEntry { at_ms: now_ms(), level, message: message.into(), tag, worker, task };
        let mut logs = self.logs.lock();
        let max = self.max_log_entries.load(Ordering::Relaxed);
        while logs.len() >= max && max > 0 {
            logs.pop_front();
        }
        if max > 0 {
            logs.push_back(entry);
        }
    }

    /// Retrieve at most `limit` log entries, most recent first, optionally
    /// filtered by level, pool tag, worker, and/or task — per spec.md
    /// §4.7's `getLogs(limit, level?, workerType?, taskId?, workerId?)`.
    #[must_use]
    pub fn get_logs(
        &self,
        limit: usize,
        level: Option<LogLevel>,
        tag: Option<&CapabilityTag>,
        worker: Option<WorkerId>,
        task: Option<TaskId>,
    ) -> Vec<LogEntry> {
        self.logs
            .lock()
            .iter()
            .rev()
            .filter(|e| level.is_none_or(|l| e.level == l))
            .filter(|e| tag.is_none_or(|t| e.tag.as_ref() == Some(t)))
            .filter(|e| worker.is_none_or(|w| e.worker == Some(w)))
            .filter(|e| task.is_none_or(|t| e.task == Some(t)))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Set the minimum severity retained by [`Self::record_log`]. Setting
    /// the same level twice is a no-op.
    pub fn set_log_level(&self, level: LogLevel) {
        *self.min_log_level.lock() = level;
    }

    /// Resize the free-form log ring's capacity, evicting the oldest
    /// entries if it shrinks below the current length.
    pub fn set_max_log_entries(&self, max: usize) {
        self.max_log_entries.store(max, Ordering::Relaxed);
        let mut logs = self.logs.lock();
        while logs.len() > max {
            logs.pop_front();
        }
    }

    /// Enable or disable automatic [`MonitorEvent::WorkerNeedsRestart`]
    /// alerts when a `FailureRate` rule fires. Setting the same value
    /// twice is a no-op.
    pub fn set_auto_restart(&self, enabled: bool) {
        self.auto_restart.store(enabled, Ordering::Relaxed);
    }

    /// Sample every built pool right now, without waiting for the next
    /// timer tick.
    #[must_use]
    pub fn sample_now(&self) -> Vec<MetricsSample> {
        let at_ms = now_ms();
        self.factory
            .built_pools()
            .into_iter()
            .map(|pool| {
                let snapshot = pool.snapshot();
                let workers = pool.worker_handles();
                let total_completed: u64 = workers.iter().map(|w| w.stats.completed).sum();
                let total_failed: u64 = workers.iter().map(|w| w.stats.failed).sum();
                let total = total_completed + total_failed;
                let failure_rate = if total == 0 { 0.0 } else { total_failed as f64 / total as f64 };
                let avg_process_time_ms = if workers.is_empty() {
                    0.0
                } else {
                    workers.iter().map(|w| w.stats.avg_process_time_ms).sum::<f64>() / workers.len() as f64
                };
                MetricsSample {
                    tag: snapshot.tag,
                    at_ms,
                    worker_count: snapshot.worker_count,
                    idle_count: snapshot.idle_count,
                    busy_count: snapshot.busy_count,
                    queued: snapshot.queued,
                    avg_process_time_ms,
                    failure_rate,
                }
            })
            .collect()
    }

    /// Run one sample-and-evaluate cycle: record a [`MonitorEvent::Sample`]
    /// for every pool and fire any [`AlertRule`] it trips. When
    /// [`Self::set_auto_restart`] is enabled, a tripped `FailureRate` rule
    /// additionally emits [`MonitorEvent::WorkerNeedsRestart`] for the
    /// pool's most failure-prone worker.
    pub fn tick(&self) {
        for sample in self.sample_now() {
            self.push_and_publish(MonitorEvent::Sample(sample.clone()));
            self.record_log(
                LogLevel::Debug,
                format!(
                    "sample: queued={} idle={} busy={} avg_ms={:.1}",
                    sample.queued, sample.idle_count, sample.busy_count, sample.avg_process_time_ms
                ),
                Some(sample.tag.clone()),
                None,
                None,
            );

            for rule in self.rules.lock().iter() {
                if !rule.matches_tag(&sample.tag) {
                    continue;
                }
                let value = match rule.metric {
                    MetricKind::QueueDepth => sample.queued as f64,
                    MetricKind::FailureRate => sample.failure_rate,
                    MetricKind::AverageProcessTime => sample.avg_process_time_ms,
                    MetricKind::Utilization => {
                        if sample.worker_count == 0 {
                            0.0
                        } else {
                            sample.busy_count as f64 / sample.worker_count as f64
                        }
                    }
                };
                if rule.fires(value) {
                    warn!(rule = %rule.name, tag = %sample.tag, value, "alert rule fired");
                    self.record_log(
                        LogLevel::Warn,
                        format!("alert `{}` fired with value {value:.3}", rule.name),
                        Some(sample.tag.clone()),
                        None,
                        None,
                    );
                    self.push_and_publish(MonitorEvent::Alert {
                        rule: rule.name.clone(),
                        tag: sample.tag.clone(),
                        value,
                        at_ms: sample.at_ms,
                    });

                    if rule.metric == MetricKind::FailureRate && self.auto_restart.load(Ordering::Relaxed) {
                        self.flag_worst_worker(&sample.tag);
                    }
                }
            }
        }
    }

    fn flag_worst_worker(&self, tag: &CapabilityTag) {
        let Ok(pool) = self.factory.get_pool(tag) else { return };
        let worst = pool
            .worker_handles()
            .into_iter()
            .filter(|w| w.stats.failed > 0)
            .max_by_key(|w| w.stats.failed);
        if let Some(worker) = worst {
            self.record_log(
                LogLevel::Warn,
                "worker flagged for restart after repeated failures",
                Some(tag.clone()),
                Some(worker.id),
                None,
            );
            self.push_and_publish(MonitorEvent::WorkerNeedsRestart {
                tag: tag.clone(),
                worker: worker.id,
                at_ms: now_ms(),
            });
        }
    }

    fn push_and_publish(&self, event: MonitorEvent) {
        {
            let mut log = self.sample_log.lock();
            if log.len() >= self.sample_log_capacity {
                log.pop_front();
            }
            log.push_back(event.clone());
        }
        let _ = self.tx.send(event);
    }

    /// Spawn a background task that calls [`Self::tick`] every `interval`
    /// until the returned handle is dropped or aborted.
    pub fn spawn_periodic(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                monitor.tick();
            }
        })
    }
}
