//! `ExtensionConnector`: optional hook for code outside this crate to
//! observe and extend a running manager.
//!
//! Not exercised by the core scheduling path; a [`crate::core::manager::UnifiedManager`]
//! calls [`ExtensionConnector::on_startup`] once during `initialize` and
//! forwards every [`crate::core::events::TaskEvent`] to
//! [`ExtensionConnector::on_task_event`] for as long as it runs. Typical
//! uses: registering additional worker sources at startup, or forwarding
//! task events to an external metrics or logging pipeline.
//!
//! [`DebugEnvelope`]/[`DebugCommand`] are a second, narrower use: a thin
//! translation layer over the monitor/pool surface for an out-of-process
//! debugging UI. The connector does not open a socket or a message port
//! itself — it only turns [`MonitorEvent`]/[`TaskEvent`] into envelopes the
//! embedder forwards over whatever transport it likes, and turns inbound
//! commands back into calls on a [`PoolFactory`]/[`WorkerMonitor`], the same
//! "adapter, not transport" split this crate's queue/mailbox backends use.

use serde::{Deserialize, Serialize};

use crate::core::error::SchedulerError;
use crate::core::events::TaskEvent;
use crate::core::factory::PoolFactory;
use crate::core::monitor::{LogEntry, LogLevel, MetricsSample, MonitorEvent, WorkerMonitor};
use crate::util::{CapabilityTag, WorkerId};

/// Extension point for code composing this crate into a larger system.
pub trait ExtensionConnector: Send + Sync {
    /// Called once before the manager's pools start accepting tasks.
    /// Typically registers additional worker sources on `factory`.
    ///
    /// # Errors
    ///
    /// Returning an error aborts [`crate::core::manager::UnifiedManager::initialize`].
    fn on_startup(&self, factory: &PoolFactory) -> Result<(), SchedulerError> {
        let _ = factory;
        Ok(())
    }

    /// Called for every task lifecycle event while the manager runs.
    fn on_task_event(&self, event: &TaskEvent) {
        let _ = event;
    }

    /// Called once during [`crate::core::manager::UnifiedManager::shutdown`],
    /// after every pool has been told to terminate.
    fn on_shutdown(&self) {}
}

/// Outbound message of spec.md §6's "Debugging channel", as sent to an
/// external debugging UI. Serializes to the `{type, data}` shape that
/// section describes, via serde's externally-tagged enum representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum DebugEnvelope {
    /// Sent once in reply to a fresh connection: every built pool's latest
    /// sample.
    InitialState {
        /// Most recent sample per pool.
        samples: Vec<MetricsSample>,
    },
    /// A routine metrics sample, forwarded as it's produced.
    Stats {
        /// The sample.
        sample: MetricsSample,
    },
    /// Reply to [`DebugCommand::RequestLogs`].
    Logs {
        /// Matching log entries, most recent first.
        entries: Vec<LogEntry>,
    },
    /// An [`AlertRule`](crate::core::monitor::AlertRule) fired, or a worker
    /// was flagged for restart.
    Alert {
        /// Human-readable description of what fired.
        message: String,
        /// Pool the alert concerns.
        tag: CapabilityTag,
    },
    /// Reply to [`DebugCommand::Ping`].
    Pong,
    /// Confirms a [`DebugCommand::UpdateMonitorSettings`] was applied.
    SettingsUpdated,
    /// Confirms a [`DebugCommand::RestartWorker`] was carried out.
    WorkerRestarted {
        /// The worker that was restarted.
        worker: WorkerId,
    },
}

/// Inbound command of spec.md §6's "Debugging channel".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum DebugCommand {
    /// Liveness check; answered with [`DebugEnvelope::Pong`].
    Ping,
    /// Request an immediate sample of every built pool.
    RequestStats,
    /// Request up to `limit` log entries, optionally filtered by minimum
    /// level and/or pool tag.
    RequestLogs {
        /// Maximum entries to return.
        limit: usize,
        /// Minimum severity to include.
        level: Option<LogLevel>,
        /// Restrict to this pool, if set.
        tag: Option<CapabilityTag>,
    },
    /// Adjust the monitor's log retention settings.
    UpdateMonitorSettings {
        /// New minimum log severity, if set.
        log_level: Option<LogLevel>,
        /// New log ring capacity, if set.
        max_log_entries: Option<usize>,
        /// New `autoRestart` toggle, if set.
        auto_restart: Option<bool>,
    },
    /// Force-restart a specific worker.
    RestartWorker {
        /// Pool the worker belongs to.
        tag: CapabilityTag,
        /// The worker to restart.
        worker: WorkerId,
    },
}

/// Translates between the monitor/pool surface and [`DebugEnvelope`]/
/// [`DebugCommand`] values, for an embedder to relay over its own
/// transport. Holds no connection state of its own.
pub struct DebugBridge {
    factory: std::sync::Arc<PoolFactory>,
    monitor: std::sync::Arc<WorkerMonitor>,
}

impl DebugBridge {
    /// Build a bridge over a running manager's factory and monitor.
    #[must_use]
    pub fn new(factory: std::sync::Arc<PoolFactory>, monitor: std::sync::Arc<WorkerMonitor>) -> Self {
        Self { factory, monitor }
    }

    /// Build the envelope sent once to a freshly connected UI.
    #[must_use]
    pub fn initial_state(&self) -> DebugEnvelope {
        DebugEnvelope::InitialState { samples: self.monitor.sample_now() }
    }

    /// Translate a live [`MonitorEvent`] into the envelope broadcast to
    /// every connected debugging UI.
    #[must_use]
    pub fn translate_monitor_event(event: &MonitorEvent) -> DebugEnvelope {
        match event {
            MonitorEvent::Sample(sample) => DebugEnvelope::Stats { sample: sample.clone() },
            MonitorEvent::Alert { rule, tag, value, .. } => DebugEnvelope::Alert {
                message: format!("alert `{rule}` fired with value {value:.3}"),
                tag: tag.clone(),
            },
            MonitorEvent::WorkerNeedsRestart { tag, worker, .. } => DebugEnvelope::Alert {
                message: format!("worker {worker} needs restart"),
                tag: tag.clone(),
            },
        }
    }

    /// Handle one inbound [`DebugCommand`], returning the reply envelope.
    ///
    /// # Errors
    ///
    /// Propagates [`SchedulerError`] from the underlying pool/factory call
    /// (`RestartWorker` against an unknown tag or worker).
    pub fn handle_command(&self, command: DebugCommand) -> Result<DebugEnvelope, SchedulerError> {
        match command {
            DebugCommand::Ping => Ok(DebugEnvelope::Pong),
            DebugCommand::RequestStats => Ok(DebugEnvelope::InitialState { samples: self.monitor.sample_now() }),
            DebugCommand::RequestLogs { limit, level, tag } => Ok(DebugEnvelope::Logs {
                entries: self.monitor.get_logs(limit, level, tag.as_ref(), None, None),
            }),
            DebugCommand::UpdateMonitorSettings { log_level, max_log_entries, auto_restart } => {
                if let Some(level) = log_level {
                    self.monitor.set_log_level(level);
                }
                if let Some(max) = max_log_entries {
                    self.monitor.set_max_log_entries(max);
                }
                if let Some(enabled) = auto_restart {
                    self.monitor.set_auto_restart(enabled);
                }
                Ok(DebugEnvelope::SettingsUpdated)
            }
            DebugCommand::RestartWorker { tag, worker } => {
                let pool = self.factory.get_pool(&tag)?;
                pool.restart_worker(worker)?;
                Ok(DebugEnvelope::WorkerRestarted { worker })
            }
        }
    }
}
