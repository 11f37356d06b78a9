//! `UnifiedManager`: the single entry point composing every scheduler
//! component into a running system.
//!
//! Owns a [`PoolFactory`] (pool construction and registry), a
//! [`TaskDispatcher`] (submission, retry, timeout), an [`EventBus`]
//! (lifecycle notifications), a [`StreamManager`] (worker-bound data
//! streams), a [`WorkerMonitor`] (sampling and alerting), and any
//! [`ExtensionConnector`]s the embedder registered. `initialize` runs each
//! connector's startup hook and starts the monitor's and maintenance
//! sweep's background timers; `shutdown` tells every built pool to drain
//! and stop, then runs each connector's shutdown hook.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::manager::ManagerConfig;
use crate::core::audit::InMemoryAuditSink;
use crate::core::connector::ExtensionConnector;
use crate::core::dispatcher::TaskDispatcher;
use crate::core::error::SchedulerError;
use crate::core::events::EventBus;
use crate::core::executor::DynWorkerExecutor;
use crate::core::factory::PoolFactory;
use crate::core::monitor::WorkerMonitor;
use crate::core::stream::{EventStream, StreamManager};
use crate::util::{builtin_tags, CapabilityTag};

const BUILTIN_TAGS: [&str; 4] = [
    builtin_tags::IMAGE,
    builtin_tags::DATA,
    builtin_tags::CALC,
    builtin_tags::MONITOR,
];
use crate::Mutex;

/// Default interval between [`WorkerMonitor::tick`] runs and queue
/// maintenance sweeps, when [`UnifiedManager::initialize`] starts the
/// background timers itself.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Composition root tying every scheduler component to one configuration.
pub struct UnifiedManager {
    config: ManagerConfig,
    factory: Arc<PoolFactory>,
    dispatcher: Arc<TaskDispatcher>,
    events: EventBus,
    monitor: Arc<WorkerMonitor>,
    connectors: Mutex<Vec<Arc<dyn ExtensionConnector>>>,
    sweep_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    monitor_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl UnifiedManager {
    /// Build a manager from `config`. Does not construct any pools yet —
    /// pools are built lazily by [`PoolFactory::get_pool`] the first time a
    /// worker source is registered and used.
    #[must_use]
    pub fn new(config: ManagerConfig) -> Arc<Self> {
        let events = EventBus::new();
        let audit: Arc<Mutex<Box<dyn crate::core::audit::AuditSink>>> =
            Arc::new(Mutex::new(Box::new(InMemoryAuditSink::new(config.audit_capacity))));
        let factory = Arc::new(PoolFactory::new(events.clone(), Some(audit)));
        let dispatcher = TaskDispatcher::new(Arc::clone(&factory));
        let monitor = WorkerMonitor::new(Arc::clone(&factory), config.audit_capacity);

        Arc::new(Self {
            config,
            factory,
            dispatcher,
            events,
            monitor,
            connectors: Mutex::new(Vec::new()),
            sweep_handle: Mutex::new(None),
            monitor_handle: Mutex::new(None),
        })
    }

    /// Register an [`ExtensionConnector`] to run during [`Self::initialize`]
    /// and [`Self::shutdown`].
    pub fn add_connector(&self, connector: Arc<dyn ExtensionConnector>) {
        self.connectors.lock().push(connector);
    }

    /// Register a worker source for `tag`, using the pool configuration from
    /// [`ManagerConfig::pool`] if one was supplied, or
    /// [`crate::config::pool::PoolConfig::new`]'s defaults otherwise.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::PoolAlreadyActive`] if a pool for `tag` has already
    /// been built; [`SchedulerError::InvalidConfig`] if the resolved
    /// configuration fails validation.
    pub fn register_worker_source(
        &self,
        tag: CapabilityTag,
        executor: DynWorkerExecutor,
    ) -> Result<(), SchedulerError> {
        let config = self
            .config
            .pool(&tag)
            .cloned()
            .unwrap_or_else(|| crate::config::pool::PoolConfig::new(tag.clone()));
        self.factory.register_custom_worker_source(tag, executor, config)
    }

    /// Bring the manager up: run every connector's startup hook, then start
    /// the monitor sampling timer and the queue-maintenance sweep timer.
    ///
    /// If [`ManagerConfig::auto_create_builtin_pools`] is set, pools are
    /// eagerly built (not just registered) for every builtin tag that has a
    /// registered worker source but hasn't been built yet.
    ///
    /// # Errors
    ///
    /// Propagates the first connector's `on_startup` error, if any.
    pub fn initialize(self: &Arc<Self>) -> Result<(), SchedulerError> {
        for connector in self.connectors.lock().iter() {
            connector.on_startup(&self.factory)?;
        }

        if self.config.auto_create_builtin_pools {
            for tag in BUILTIN_TAGS {
                let tag = CapabilityTag::new(tag);
                if self.factory.get_pool_types().contains(&tag) {
                    let _ = self.factory.get_pool(&tag);
                }
            }
        }

        *self.monitor_handle.lock() = Some(self.monitor.spawn_periodic(DEFAULT_SWEEP_INTERVAL));
        *self.sweep_handle.lock() = Some(self.spawn_sweep(DEFAULT_SWEEP_INTERVAL));

        info!("manager initialized");
        Ok(())
    }

    fn spawn_sweep(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for pool in manager.factory.built_pools() {
                    pool.prune_expired_queue();
                    pool.evict_idle();
                }
            }
        })
    }

    /// Drain and stop every built pool, then run every connector's shutdown
    /// hook. Queued tasks are reported as cancelled; running tasks are
    /// allowed to finish their current attempt inside their slot before the
    /// slot is torn down.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.monitor_handle.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.sweep_handle.lock().take() {
            handle.abort();
        }

        self.streams().close_all();

        for pool in self.factory.built_pools() {
            pool.terminate_all();
        }

        for connector in self.connectors.lock().iter() {
            connector.on_shutdown();
        }

        info!("manager shut down");
    }

    /// Shared task submission/retry surface.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<TaskDispatcher> {
        &self.dispatcher
    }

    /// Submit a task — spec.md §4.8's `submitTask`, forwarded to the shared
    /// [`TaskDispatcher`].
    ///
    /// # Errors
    ///
    /// See [`TaskDispatcher::submit_task`].
    pub fn submit_task(
        &self,
        operation: impl Into<String>,
        payload: Vec<u8>,
        opts: crate::core::dispatcher::SubmitOptions,
    ) -> Result<crate::util::TaskId, SchedulerError> {
        self.dispatcher.submit_task(operation, payload, opts)
    }

    /// Current status of a task submitted through this manager — spec.md
    /// §4.8's `getTaskStatus`.
    #[must_use]
    pub fn get_task_status(&self, task: crate::util::TaskId) -> Option<crate::core::task::TaskStatus> {
        self.dispatcher.get_task_status(task)
    }

    /// Snapshot metrics for every built pool, sampled right now — spec.md
    /// §4.8's `getPoolStats`.
    #[must_use]
    pub fn get_pool_stats(&self) -> Vec<crate::core::monitor::MetricsSample> {
        self.monitor.sample_now()
    }

    /// The `n` most recent log entries across every pool — spec.md §4.8's
    /// `getLogs`.
    #[must_use]
    pub fn get_logs(&self, n: usize) -> Vec<crate::core::monitor::LogEntry> {
        self.monitor.get_logs(n, None, None, None, None)
    }

    /// Map an operation name to a capability tag for auto-routed
    /// submissions — spec.md §4.8's `registerTaskType`, forwarded to
    /// [`PoolFactory::register_task_type`].
    pub fn register_task_type(&self, operation: impl Into<String>, tag: CapabilityTag) {
        self.factory.register_task_type(operation, tag);
    }

    /// Shared pool registry.
    #[must_use]
    pub fn factory(&self) -> &Arc<PoolFactory> {
        &self.factory
    }

    /// Get (building on first call) the pool serving `tag` — spec.md
    /// §4.8's `getPool(tag)`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownOperation`] if no worker source was
    /// registered for `tag`.
    pub fn get_pool(&self, tag: &CapabilityTag) -> Result<Arc<crate::core::pool::WorkerPool>, SchedulerError> {
        self.factory.get_pool(tag)
    }

    /// Lifecycle event bus, shared by every pool this manager builds.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Worker-bound data stream registry, shared with every pool the
    /// factory builds so a lost worker can reach the streams bound to it.
    #[must_use]
    pub fn streams(&self) -> &Arc<StreamManager> {
        self.factory.streams()
    }

    /// Metrics sampling and alerting.
    #[must_use]
    pub fn monitor(&self) -> &Arc<WorkerMonitor> {
        &self.monitor
    }

    /// Open a new stream against `tag`'s pool — spec.md §4.6/§4.8's
    /// `createStream`. Reserves an idle worker (spawning one if the pool
    /// has spare capacity), binds a stream to it for its lifetime, and
    /// marks it ready immediately (this crate has no separate worker-side
    /// `STREAM_INIT` round-trip to wait on).
    ///
    /// Commands the caller sends with [`EventStream::send`] are handed one
    /// at a time to the pool's [`crate::core::executor::WorkerExecutor::handle_stream_command`]
    /// until the stream closes or its worker is lost.
    ///
    /// # Errors
    ///
    /// Propagates [`SchedulerError::UnknownOperation`] if `tag` has no
    /// registered worker source, or [`SchedulerError::CapacityExceeded`] if
    /// the pool has no spare worker to host it.
    pub fn create_stream(&self, tag: CapabilityTag) -> Result<EventStream, SchedulerError> {
        let pool = self.factory.get_pool(&tag)?;
        let worker_id = pool.reserve_worker_for_stream()?;
        let (handle, stream) = self.streams().open(worker_id);
        handle.mark_ready();

        if let Some(mut inbound) = self.streams().take_inbound(stream.id()) {
            let executor = Arc::clone(pool.executor());
            tokio::spawn(async move {
                use crate::core::stream::StreamStatus;
                while let Some(data) = inbound.recv().await {
                    if matches!(handle.status(), StreamStatus::Closed | StreamStatus::Error) {
                        break;
                    }
                    let _ = executor.handle_stream_command(data, &handle).await;
                }
            });
        }

        Ok(stream)
    }

    /// Close a stream opened by [`Self::create_stream`] and release its
    /// worker back to `tag`'s pool for ordinary task dispatch.
    ///
    /// # Errors
    ///
    /// Propagates [`SchedulerError::UnknownOperation`] if `tag` has no
    /// registered worker source.
    pub fn close_stream(&self, tag: &CapabilityTag, stream: &EventStream) -> Result<(), SchedulerError> {
        let worker_id = stream.worker();
        self.streams().close(stream.id());
        let pool = self.factory.get_pool(tag)?;
        pool.release_stream_worker(worker_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::pool::PoolConfig;
    use crate::core::dispatcher::SubmitOptions;
    use crate::core::task::TaskOutcome;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl crate::core::executor::WorkerExecutor for Echo {
        async fn execute(
            &self,
            _operation: &str,
            payload: Vec<u8>,
            _progress: &crate::core::executor::ProgressSink,
        ) -> Result<Vec<u8>, crate::core::executor::WorkerExecError> {
            Ok(payload)
        }
    }

    #[tokio::test]
    async fn submits_and_completes_through_the_manager() {
        let manager = UnifiedManager::new(ManagerConfig::default());
        let tag = CapabilityTag::new("echo");
        manager
            .register_worker_source(tag.clone(), Arc::new(Echo))
            .expect("register worker source");
        manager.initialize().expect("initialize");

        let opts = SubmitOptions { worker_type: Some(tag), ..SubmitOptions::default() };
        let id = manager.submit_task("run", b"hi".to_vec(), opts).expect("submit");

        let outcome = manager.dispatcher().await_task(id).await.expect("await task");
        assert!(matches!(outcome, TaskOutcome::Completed(payload) if payload == b"hi"));
        assert_eq!(manager.get_task_status(id), Some(crate::core::task::TaskStatus::Completed));

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn submit_task_auto_routes_through_a_registered_task_type() {
        let manager = UnifiedManager::new(ManagerConfig::default());
        let tag = CapabilityTag::new("echo");
        manager.register_worker_source(tag.clone(), Arc::new(Echo)).expect("register worker source");
        manager.register_task_type("run", tag);
        manager.initialize().expect("initialize");

        let id = manager.submit_task("run", b"hi".to_vec(), SubmitOptions::default()).expect("submit");
        let outcome = manager.dispatcher().await_task(id).await.expect("await task");
        assert!(matches!(outcome, TaskOutcome::Completed(payload) if payload == b"hi"));

        let stats = manager.get_pool_stats();
        assert_eq!(stats.len(), 1);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn create_stream_reserves_a_worker_excluded_from_task_dispatch() {
        let manager = UnifiedManager::new(ManagerConfig::default());
        let tag = CapabilityTag::new("counter");
        manager.register_worker_source(tag.clone(), Arc::new(Echo)).expect("register");
        manager.initialize().expect("initialize");

        let mut stream = manager.create_stream(tag.clone()).expect("create stream");
        assert!(matches!(stream.recv().await, Some(crate::core::stream::StreamEvent::Ready)));
        assert_eq!(manager.streams().open_count(), 1);

        manager.close_stream(&tag, &stream).expect("close stream");
        assert!(matches!(stream.recv().await, Some(crate::core::stream::StreamEvent::Closed)));
        assert_eq!(manager.streams().open_count(), 0);

        manager.shutdown().await;
    }

    struct CounterSource {
        value: Mutex<i64>,
    }

    #[async_trait]
    impl crate::core::executor::WorkerExecutor for CounterSource {
        async fn execute(
            &self,
            _operation: &str,
            payload: Vec<u8>,
            _progress: &crate::core::executor::ProgressSink,
        ) -> Result<Vec<u8>, crate::core::executor::WorkerExecError> {
            Ok(payload)
        }

        async fn handle_stream_command(
            &self,
            data: Vec<u8>,
            stream: &crate::core::stream::StreamHandle,
        ) -> Result<(), crate::core::executor::WorkerExecError> {
            let command = String::from_utf8_lossy(&data);
            let mut value = self.value.lock();
            let (command, arg) = command.split_once(':').unwrap_or((&command, "0"));
            match command {
                "increment" => *value += arg.parse::<i64>().unwrap_or(0),
                "decrement" => *value -= arg.parse::<i64>().unwrap_or(0),
                "get" => {}
                _ => {}
            }
            let _ = stream.send_data(value.to_string().into_bytes());
            Ok(())
        }
    }

    #[tokio::test]
    async fn stream_commands_drive_the_bound_workers_counter_state() {
        let manager = UnifiedManager::new(ManagerConfig::default());
        let tag = CapabilityTag::new("counter");
        manager
            .register_worker_source(tag.clone(), Arc::new(CounterSource { value: Mutex::new(10) }))
            .expect("register");
        manager.initialize().expect("initialize");

        let mut stream = manager.create_stream(tag.clone()).expect("create stream");
        assert!(matches!(stream.recv().await, Some(crate::core::stream::StreamEvent::Ready)));

        stream.send(b"increment:5".to_vec()).expect("send increment");
        stream.send(b"decrement:3".to_vec()).expect("send decrement");
        stream.send(b"get:0".to_vec()).expect("send get");

        let mut values = Vec::new();
        for _ in 0..3 {
            match stream.recv().await {
                Some(crate::core::stream::StreamEvent::Message(data)) => {
                    values.push(String::from_utf8(data).unwrap());
                }
                other => panic!("expected a message event, got {other:?}"),
            }
        }
        assert_eq!(values, vec!["15", "12", "12"]);

        manager.close_stream(&tag, &stream).expect("close stream");
        assert!(matches!(stream.recv().await, Some(crate::core::stream::StreamEvent::Closed)));
        assert!(stream.send(b"too-late".to_vec()).is_err() || stream.recv().await.is_none());

        manager.shutdown().await;
    }

    #[test]
    fn resolves_pool_config_from_manager_config_when_present() {
        let tag = CapabilityTag::new("custom");
        let config = ManagerConfig::default().with_pool(PoolConfig::new(tag.clone()));
        let manager = UnifiedManager::new(config);
        manager
            .register_worker_source(tag, Arc::new(Echo))
            .expect("register worker source");
    }
}
