//! Core scheduling abstractions: tasks, workers, pools, and orchestration.

pub mod audit;
pub mod connector;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod executor;
pub mod factory;
pub mod mailbox;
pub mod manager;
pub mod monitor;
pub mod pool;
pub mod queue;
pub mod stream;
pub mod task;
pub mod worker;

pub use audit::{build_audit_event, AuditEvent, AuditSink, InMemoryAuditSink, PostgresAuditSink};
pub use connector::ExtensionConnector;
pub use dispatcher::{SubmitOptions, TaskDispatcher};
pub use error::{AppResult, SchedulerError};
pub use events::{EventBus, TaskEvent, TaskEventKind};
pub use executor::{DynWorkerExecutor, ProgressSink, WorkerExecError, WorkerExecutor};
pub use factory::PoolFactory;
pub use mailbox::Mailbox;
pub use manager::UnifiedManager;
pub use monitor::{
    AlertRule, Comparison, LogEntry, LogLevel, MetricKind, MetricsSample, MonitorEvent,
    WorkerMonitor,
};
pub use pool::{PoolSnapshot, WorkerPool};
pub use queue::TaskQueue;
pub use stream::{EventStream, StreamEvent, StreamManager, StreamStatus};
pub use task::{Priority, RetryPolicy, Task, TaskOutcome, TaskStatus};
pub use worker::{WorkerHandle, WorkerStats, WorkerStatus};
