//! `PoolFactory`: lazy construction and registry of per-tag worker pools.
//!
//! Capability tags are an open set (spec.md's dynamic capability
//! registration note): nothing pre-declares `"image"` or `"calc"` as
//! special beyond [`crate::util::builtin_tags`] being pre-registered when a
//! [`crate::config::manager::ManagerConfig`] asks for it. Any caller may
//! register a new tag at any time via [`PoolFactory::register_custom_worker_source`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::pool::{MailboxBackendConfig, PoolConfig, QueueBackendConfig};
use crate::core::audit::AuditSink;
use crate::core::error::SchedulerError;
use crate::core::events::EventBus;
use crate::core::executor::DynWorkerExecutor;
use crate::core::mailbox::Mailbox;
use crate::core::pool::WorkerPool;
use crate::core::queue::TaskQueue;
use crate::core::stream::StreamManager;
use crate::infra::mailbox::{FileMailbox, InMemoryMailbox, PostgresMailbox};
use crate::infra::queue::{FileQueue, InMemoryQueue, PostgresQueue};
use crate::util::CapabilityTag;
use crate::Mutex;

struct Registration {
    executor: DynWorkerExecutor,
    config: PoolConfig,
    operations: HashSet<String>,
}

/// Registry of worker sources and the pools built from them.
pub struct PoolFactory {
    registrations: Mutex<HashMap<CapabilityTag, Registration>>,
    pools: Mutex<HashMap<CapabilityTag, Arc<WorkerPool>>>,
    events: EventBus,
    audit: Option<Arc<Mutex<Box<dyn AuditSink>>>>,
    streams: Arc<StreamManager>,
    operation_tags: Mutex<HashMap<String, CapabilityTag>>,
    default_tag: Mutex<Option<CapabilityTag>>,
}

impl PoolFactory {
    /// Create an empty factory sharing `events`/`audit` with every pool it
    /// builds. Also owns the [`StreamManager`] every pool it builds shares,
    /// so a worker lost to a crash or restart can reach the streams bound
    /// to it regardless of which pool hosted it.
    #[must_use]
    pub fn new(events: EventBus, audit: Option<Arc<Mutex<Box<dyn AuditSink>>>>) -> Self {
        Self {
            registrations: Mutex::new(HashMap::new()),
            pools: Mutex::new(HashMap::new()),
            events,
            audit,
            streams: Arc::new(StreamManager::new()),
            operation_tags: Mutex::new(HashMap::new()),
            default_tag: Mutex::new(None),
        }
    }

    /// The stream registry shared by every pool this factory builds.
    #[must_use]
    pub fn streams(&self) -> &Arc<StreamManager> {
        &self.streams
    }

    /// Register a worker source for `tag`. Building the actual pool is
    /// deferred to the first [`Self::get_pool`] call.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::PoolAlreadyActive`] if a pool has already been
    /// built for this tag — re-registering a live tag would leave existing
    /// workers running the old source while new tasks expect the new one.
    pub fn register_custom_worker_source(
        &self,
        tag: CapabilityTag,
        executor: DynWorkerExecutor,
        config: PoolConfig,
    ) -> Result<(), SchedulerError> {
        if self.pools.lock().contains_key(&tag) {
            return Err(SchedulerError::PoolAlreadyActive(tag));
        }
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        self.registrations.lock().insert(
            tag,
            Registration { executor, config, operations: HashSet::new() },
        );
        Ok(())
    }

    /// Declare that `operation` is valid for `tag`. Once any operation is
    /// declared, [`Self::check_operation`] rejects names outside the set;
    /// tags with no declared operations accept anything (the default, for
    /// worker sources that dispatch however they like internally).
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownOperation`] if `tag` has no registered
    /// worker source.
    pub fn register_operation(&self, tag: &CapabilityTag, operation: impl Into<String>) -> Result<(), SchedulerError> {
        let mut regs = self.registrations.lock();
        let reg = regs
            .get_mut(tag)
            .ok_or_else(|| SchedulerError::UnknownOperation(tag.to_string()))?;
        reg.operations.insert(operation.into());
        Ok(())
    }

    /// Validate that `operation` is acceptable for `tag`, per
    /// [`Self::register_operation`]'s rules.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownOperation`] if `tag` has no worker source,
    /// or if `tag` declared a non-empty operation set that excludes
    /// `operation`.
    pub fn check_operation(&self, tag: &CapabilityTag, operation: &str) -> Result<(), SchedulerError> {
        let regs = self.registrations.lock();
        let reg = regs
            .get(tag)
            .ok_or_else(|| SchedulerError::UnknownOperation(tag.to_string()))?;
        if reg.operations.is_empty() || reg.operations.contains(operation) {
            Ok(())
        } else {
            Err(SchedulerError::UnknownOperation(format!("{tag}::{operation}")))
        }
    }

    /// Every tag with a registered worker source, built or not.
    #[must_use]
    pub fn get_pool_types(&self) -> Vec<CapabilityTag> {
        self.registrations.lock().keys().cloned().collect()
    }

    /// Tags of every pool actually built so far — spec.md §4.4's per-pool
    /// iteration surface, used by [`crate::core::monitor::WorkerMonitor`].
    #[must_use]
    pub fn pool_names(&self) -> Vec<CapabilityTag> {
        self.pools.lock().keys().cloned().collect()
    }

    /// Map `operation` to `tag` for [`Self::resolve_tag`] — spec.md §4.4's
    /// `registerOperation(op, tag)`, the operation-name -> capability-tag
    /// half of dispatch routing (distinct from [`Self::register_operation`],
    /// which declares an allowlist of operation names *within* one already-known
    /// tag). Re-registering the same operation replaces its mapping; this is
    /// a plain routing table, not a resource the dispatcher holds exclusively,
    /// so there is no `PoolAlreadyActive`-style rejection.
    pub fn register_task_type(&self, operation: impl Into<String>, tag: CapabilityTag) {
        self.operation_tags.lock().insert(operation.into(), tag);
    }

    /// Fallback tag [`Self::resolve_tag`] returns for operations with no
    /// explicit [`Self::register_task_type`] mapping.
    pub fn set_default_tag(&self, tag: CapabilityTag) {
        *self.default_tag.lock() = Some(tag);
    }

    /// The configured fallback tag, if any.
    #[must_use]
    pub fn default_tag(&self) -> Option<CapabilityTag> {
        self.default_tag.lock().clone()
    }

    /// Resolve `operation` to the capability tag that should handle it —
    /// spec.md §4.5 dispatch step 1: `tag = operationMap[op]`; if none, the
    /// configured default tag; if neither, [`SchedulerError::UnknownOperation`].
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownOperation`] if `operation` has no registered
    /// mapping and no default tag is configured.
    pub fn resolve_tag(&self, operation: &str) -> Result<CapabilityTag, SchedulerError> {
        if let Some(tag) = self.operation_tags.lock().get(operation).cloned() {
            return Ok(tag);
        }
        self.default_tag
            .lock()
            .clone()
            .ok_or_else(|| SchedulerError::UnknownOperation(operation.to_string()))
    }

    /// Get (building on first call) the pool serving `tag`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownOperation`] if no worker source was
    /// registered for `tag`; propagates construction errors from
    /// [`WorkerPool::new`] and the selected backend constructors otherwise.
    pub fn get_pool(&self, tag: &CapabilityTag) -> Result<Arc<WorkerPool>, SchedulerError> {
        if let Some(pool) = self.pools.lock().get(tag) {
            return Ok(Arc::clone(pool));
        }

        let (executor, config) = {
            let regs = self.registrations.lock();
            let reg = regs
                .get(tag)
                .ok_or_else(|| SchedulerError::UnknownOperation(tag.to_string()))?;
            (Arc::clone(&reg.executor), reg.config.clone())
        };

        let queue = build_queue(&config)?;
        let mailbox = build_mailbox(&config)?;
        let pool = WorkerPool::new(
            config,
            executor,
            queue,
            mailbox,
            self.events.clone(),
            self.audit.clone(),
            Some(Arc::clone(&self.streams)),
        )?;

        self.pools.lock().insert(tag.clone(), Arc::clone(&pool));
        Ok(pool)
    }

    /// Every pool built so far.
    #[must_use]
    pub fn built_pools(&self) -> Vec<Arc<WorkerPool>> {
        self.pools.lock().values().cloned().collect()
    }

    /// The lifecycle event bus shared by every pool this factory builds —
    /// used by callers (the dispatcher's retry loop, the monitor) that need
    /// to publish or subscribe without going through a specific pool.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

fn build_queue(config: &PoolConfig) -> Result<Box<dyn TaskQueue>, SchedulerError> {
    Ok(match &config.queue {
        QueueBackendConfig::InMemory => Box::new(InMemoryQueue::new(config.max_queue_depth)),
        QueueBackendConfig::File { path } => Box::new(FileQueue::new(
            path,
            config.tag.as_str(),
            config.max_queue_depth,
        )?),
        QueueBackendConfig::Postgres => Box::new(PostgresQueue::new(config.max_queue_depth)),
    })
}

fn build_mailbox(config: &PoolConfig) -> Result<Box<dyn Mailbox>, SchedulerError> {
    Ok(match &config.mailbox {
        MailboxBackendConfig::InMemory => Box::new(InMemoryMailbox::new()),
        MailboxBackendConfig::File { path } => {
            Box::new(FileMailbox::new(path, config.tag.as_str())?)
        }
        MailboxBackendConfig::Postgres => Box::new(PostgresMailbox::new()),
    })
}
