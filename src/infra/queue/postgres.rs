//! Postgres-backed queue adapter (schema and interface stub).

use crate::core::error::SchedulerError;
use crate::core::queue::TaskQueue;
use crate::core::task::Task;
use crate::util::TaskId;

/// Postgres queue adapter placeholder. Not wired to a database client;
/// exists so [`crate::config::pool::QueueBackendConfig::Postgres`] has a
/// concrete type to construct and so the migration statements live
/// somewhere version-controlled.
pub struct PostgresQueue {
    max_depth: usize,
}

impl PostgresQueue {
    /// Create a new adapter with a max depth.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Migration statements for a pgmq-style job table.
    #[must_use]
    pub fn migrations() -> &'static [&'static str] {
        &[r#"
CREATE TABLE IF NOT EXISTS workcell_queue_jobs (
    id BIGSERIAL PRIMARY KEY,
    task_id TEXT NOT NULL,
    tag TEXT NOT NULL,
    priority SMALLINT NOT NULL,
    deadline_ms NUMERIC,
    payload JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_workcell_queue_priority ON workcell_queue_jobs (priority DESC, created_at);
CREATE INDEX IF NOT EXISTS idx_workcell_queue_deadline ON workcell_queue_jobs (deadline_ms);
"#]
    }
}

impl TaskQueue for PostgresQueue {
    fn enqueue(&mut self, _task: Task) -> Result<(), SchedulerError> {
        Err(SchedulerError::Backend(
            "postgres queue not wired to database client".into(),
        ))
    }

    fn dequeue(&mut self) -> Option<Task> {
        None
    }

    fn prune_expired(&mut self, _now_ms: u128) -> Vec<Task> {
        Vec::new()
    }

    fn remove(&mut self, _id: TaskId) -> Option<Task> {
        None
    }

    fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn len(&self) -> usize {
        0
    }
}
