//! The worker-side execution contract.
//!
//! A capability tag's pool is bound to exactly one [`WorkerExecutor`]
//! implementation (its "worker source") for the pool's lifetime — see
//! `SPEC_FULL.md`'s note on dynamic capability registration. Each
//! [`crate::adapter`] strategy drives this trait from inside either a
//! native OS thread or a cooperative task.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Error returned by a worker body while executing one task.
///
/// `retryable` is the worker's own hint to the dispatcher's retry policy
/// (spec.md §9's Open Question on retry-error tagging): workers that know
/// a failure is transient (a flaky downstream call) set it `true`;
/// workers that know it is fatal (malformed input) set it `false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerExecError {
    /// Human-readable failure description.
    pub message: String,
    /// Whether the dispatcher should retry the owning task.
    pub retryable: bool,
}

impl WorkerExecError {
    /// Construct a non-retryable error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: false }
    }

    /// Construct a retryable error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: true }
    }
}

impl std::fmt::Display for WorkerExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for WorkerExecError {}

/// Handed to a [`WorkerExecutor`] so it can report incremental progress
/// (spec.md §4.5's `taskProgress` event) without knowing anything about
/// the pool or event bus relaying it.
#[derive(Clone)]
pub struct ProgressSink(mpsc::UnboundedSender<u8>);

impl ProgressSink {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<u8>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    /// Report completion percentage, clamped to `[0, 100]`.
    pub fn report(&self, percent: u8) {
        let _ = self.0.send(percent.min(100));
    }
}

/// A worker source: the business logic bound to a pool's capability tag.
///
/// Implementations dispatch on `operation` (the name passed to
/// `submit_task`) and run `payload` to completion, returning an opaque
/// result payload or a tagged error. Implementations must be safe to call
/// concurrently from multiple worker slots at once; any shared state needs
/// its own synchronization.
#[async_trait]
pub trait WorkerExecutor: Send + Sync + 'static {
    /// Execute one task attempt. `progress` may be used to report
    /// incremental completion; calling it is optional and has no effect on
    /// how the task's final outcome is interpreted.
    async fn execute(
        &self,
        operation: &str,
        payload: Vec<u8>,
        progress: &ProgressSink,
    ) -> Result<Vec<u8>, WorkerExecError>;

    /// Handle one inbound command sent via [`crate::core::stream::EventStream::send`]
    /// to a stream this worker hosts. `stream` is the producer handle for
    /// emitting `Message`/`Pause`/`Resume`/`Error` events back to the
    /// consumer. Default no-op, for worker sources that never host a
    /// stream.
    async fn handle_stream_command(
        &self,
        _data: Vec<u8>,
        _stream: &crate::core::stream::StreamHandle,
    ) -> Result<(), WorkerExecError> {
        Ok(())
    }
}

/// Type-erased handle to a registered worker source, shared across every
/// slot of a pool.
pub type DynWorkerExecutor = std::sync::Arc<dyn WorkerExecutor>;
