//! Postgres-backed outcome store (schema and interface stub).

use crate::core::error::SchedulerError;
use crate::core::mailbox::Mailbox;
use crate::core::task::TaskOutcome;
use crate::util::TaskId;

/// Postgres mailbox adapter placeholder. Not wired to a database client;
/// exists so [`crate::config::pool::MailboxBackendConfig::Postgres`] has a
/// concrete type to construct and so the migration statements live
/// somewhere version-controlled.
pub struct PostgresMailbox {
    _private: (),
}

impl PostgresMailbox {
    /// Create a new adapter.
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Migration statements for outcome storage.
    #[must_use]
    pub fn migrations() -> &'static [&'static str] {
        &[r#"
CREATE TABLE IF NOT EXISTS workcell_outcomes (
    task_id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    payload BYTEA,
    error TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#]
    }
}

impl Default for PostgresMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox for PostgresMailbox {
    fn deliver(&mut self, _task: TaskId, _outcome: TaskOutcome) -> Result<(), SchedulerError> {
        Err(SchedulerError::Backend(
            "postgres mailbox not wired to database client".into(),
        ))
    }

    fn fetch(&self, _task: TaskId) -> Option<TaskOutcome> {
        None
    }

    fn remove(&mut self, _task: TaskId) -> Option<TaskOutcome> {
        None
    }
}
