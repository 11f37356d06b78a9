//! OS-thread worker slot.
//!
//! Each slot owns a dedicated thread running a single-threaded tokio
//! runtime, so a blocking or CPU-heavy [`WorkerExecutor`] body cannot starve
//! the host's main runtime. Jobs arrive over a bounded `crossbeam_channel`;
//! the pool only ever has at most one job in flight per slot, so a
//! capacity-1 channel is enough to make handoff synchronous without
//! blocking the sender.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};
use tracing::{debug, warn};

use crate::adapter::{SlotClosed, SlotJob, WorkerSlot};
use crate::core::executor::DynWorkerExecutor;
use crate::util::WorkerId;

/// A worker slot backed by a dedicated OS thread.
pub struct ThreadSlot {
    tx: Sender<SlotJob>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadSlot {
    /// Spawn the thread and its runtime, returning a handle for sending jobs.
    pub fn spawn(worker_id: WorkerId, executor: DynWorkerExecutor, stack_size: Option<usize>) -> Self {
        let (tx, rx) = bounded::<SlotJob>(1);

        let mut builder = thread::Builder::new().name(format!("workcell-worker-{worker_id}"));
        if let Some(size) = stack_size {
            builder = builder.stack_size(size);
        }

        let handle = builder
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(err) => {
                        warn!(%worker_id, error = %err, "worker thread failed to start tokio runtime");
                        return;
                    }
                };

                runtime.block_on(async move {
                    while let Ok(job) = rx.recv() {
                        let SlotJob { task, respond_to, progress } = job;
                        debug!(%worker_id, task = %task.id, "worker thread executing task");
                        let result = executor.execute(&task.operation, task.payload, &progress).await;
                        let _ = respond_to.send(result);
                    }
                });

                debug!(%worker_id, "worker thread exiting: job channel closed");
            })
            .expect("failed to spawn worker thread");

        Self { tx, handle: Some(handle) }
    }
}

impl WorkerSlot for ThreadSlot {
    fn send(&self, job: SlotJob) -> Result<(), SlotClosed> {
        self.tx.try_send(job).map_err(|_| SlotClosed)
    }

    fn shutdown(&self) {
        // Dropping the sender side unblocks the thread's `recv` loop; since
        // `tx` is shared by reference here, shutdown is driven by the pool
        // dropping this `ThreadSlot` entirely (see `Drop` below).
    }
}

impl Drop for ThreadSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            // `tx` drops alongside `self`, which closes the channel and lets
            // the thread's `recv` loop return.
            let _ = handle.join();
        }
    }
}
