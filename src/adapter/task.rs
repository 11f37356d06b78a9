//! Cooperative-task worker slot.
//!
//! Each slot is a tokio task looping over an `mpsc` channel, for worker
//! sources that are themselves lightweight or already async — no dedicated
//! OS thread is warranted. The channel is capacity 1 for the same reason
//! as [`super::thread::ThreadSlot`]: the pool never queues more than one
//! job per idle slot.

use tokio::sync::mpsc;
use tracing::debug;

use crate::adapter::{SlotClosed, SlotJob, WorkerSlot};
use crate::core::executor::DynWorkerExecutor;
use crate::util::WorkerId;

/// A worker slot backed by a cooperative tokio task.
pub struct TaskSlot {
    tx: mpsc::Sender<SlotJob>,
    handle: tokio::task::JoinHandle<()>,
}

impl TaskSlot {
    /// Spawn the task, returning a handle for sending jobs.
    pub fn spawn(worker_id: WorkerId, executor: DynWorkerExecutor) -> Self {
        let (tx, mut rx) = mpsc::channel::<SlotJob>(1);

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let SlotJob { task, respond_to, progress } = job;
                debug!(%worker_id, task = %task.id, "worker task executing task");
                let result = executor.execute(&task.operation, task.payload, &progress).await;
                let _ = respond_to.send(result);
            }
            debug!(%worker_id, "worker task exiting: job channel closed");
        });

        Self { tx, handle }
    }
}

impl WorkerSlot for TaskSlot {
    fn send(&self, job: SlotJob) -> Result<(), SlotClosed> {
        self.tx.try_send(job).map_err(|_| SlotClosed)
    }

    fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
