//! # workcell
//!
//! An in-process worker-pool and task-dispatch engine for heterogeneous,
//! CPU-bound jobs: priority queueing, dispatch by capability tag,
//! retry/timeout/cancellation semantics, worker-bound event streams, and
//! live monitoring with metrics and alerts.
//!
//! ## Core problem solved
//!
//! Background jobs (image transforms, data crunching, arbitrary
//! CPU-bound operations) need somewhere to run that does not block the
//! host application's main execution context, with:
//!
//! - **Capability-based routing**: different kinds of work go to
//!   differently-provisioned pools of workers without the caller knowing
//!   how each pool is implemented.
//! - **Bounded concurrency**: each pool grows and shrinks between a
//!   configured floor and ceiling instead of spawning unboundedly.
//! - **Resilience**: a worker crash or a task exceeding its deadline is
//!   retried under an exponential backoff budget rather than silently
//!   dropped.
//! - **Live sessions**: some work is not one-shot — a stream binds to a
//!   single worker for a bidirectional session's lifetime.
//! - **Observability**: metrics, alerts, and an audit trail are available
//!   without the caller wiring up its own instrumentation.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use workcell::config::manager::ManagerConfig;
//! use workcell::core::executor::{ProgressSink, WorkerExecError, WorkerExecutor};
//! use workcell::core::dispatcher::SubmitOptions;
//! use workcell::core::manager::UnifiedManager;
//! use workcell::util::CapabilityTag;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl WorkerExecutor for Echo {
//!     async fn execute(
//!         &self,
//!         _operation: &str,
//!         payload: Vec<u8>,
//!         _progress: &ProgressSink,
//!     ) -> Result<Vec<u8>, WorkerExecError> {
//!         Ok(payload)
//!     }
//! }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let manager = UnifiedManager::new(ManagerConfig::default());
//! let tag = CapabilityTag::new("calc");
//! manager.register_worker_source(tag.clone(), Arc::new(Echo))?;
//! manager.register_task_type("run", tag);
//! manager.initialize()?;
//!
//! let id = manager.submit_task("run", b"hi".to_vec(), SubmitOptions::default())?;
//! let outcome = manager.dispatcher().await_task(id).await?;
//! println!("{outcome:?}");
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! For complete examples, see the integration tests under `tests/`.

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Worker execution strategies (dedicated OS thread vs. cooperative task).
pub mod adapter;
/// Configuration models for pools, the manager, and environment overrides.
pub mod config;
/// Core scheduling abstractions: tasks, workers, pools, dispatch, streams, monitoring.
pub mod core;
/// Pluggable queue and mailbox backends (in-memory, file, Postgres-stub).
pub mod infra;
/// Shared utilities: identifiers, clocks, telemetry bootstrap.
pub mod util;

mod condvar;
mod mutex;
mod once;
mod rwlock;

pub use condvar::Condvar;
pub use mutex::{MappedMutexGuard, Mutex, MutexGuard};
pub use once::{Once, OnceCell};
pub use rwlock::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard,
    RwLockUpgradableReadGuard, RwLockWriteGuard,
};
