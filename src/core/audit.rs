//! Audit trail of lifecycle actions, for post-hoc debugging of a pool.
//!
//! Separate from both the event stream (live, subscriber-facing) and the
//! monitor's log ring (metrics-facing): the audit trail is the append-only
//! record of *what the manager decided and why* — submit, enqueue,
//! dispatch, retry, evict — independent of whether anyone was watching.

use std::collections::VecDeque;

use crate::util::{now_ms, CapabilityTag, TaskId};

/// One recorded lifecycle action.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Event identifier (a fresh UUID rendered to a string).
    pub event_id: String,
    /// Task the action concerns.
    pub task_id: TaskId,
    /// Pool the action occurred in.
    pub tag: CapabilityTag,
    /// Action taken: `"submit"`, `"enqueue"`, `"dispatch"`, `"retry"`,
    /// `"complete"`, `"fail"`, `"timeout"`, `"cancel"`, `"evict"`.
    pub action: String,
    /// Timestamp in milliseconds since the epoch.
    pub created_at_ms: u128,
    /// Free-form context, e.g. the error message for a `"fail"` action.
    pub detail: Option<String>,
}

/// Audit sink abstraction, so the destination (memory, file, database) is
/// swappable without touching call sites.
pub trait AuditSink: Send {
    /// Record an event.
    fn record(&mut self, event: AuditEvent);
}

/// Bounded in-memory sink; the default for development and tests.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a sink retaining at most `max_events`, dropping the oldest
    /// once full.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events.min(4096)),
            max_events,
        }
    }

    /// Snapshot the currently retained events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Postgres-backed audit sink (schema-only; database I/O not wired).
pub struct PostgresAuditSink;

impl PostgresAuditSink {
    /// Migration statements for the audit log table.
    #[must_use]
    pub fn migrations() -> &'static [&'static str] {
        &[r#"
CREATE TABLE IF NOT EXISTS workcell_audit_events (
    event_id TEXT PRIMARY KEY,
    task_id TEXT NOT NULL,
    tag TEXT NOT NULL,
    action TEXT NOT NULL,
    detail TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_workcell_audit_tag_created ON workcell_audit_events (tag, created_at);
CREATE INDEX IF NOT EXISTS idx_workcell_audit_task ON workcell_audit_events (task_id);
"#]
    }
}

impl AuditSink for PostgresAuditSink {
    fn record(&mut self, _event: AuditEvent) {
        // Stub: actual DB writes require a runtime + client; left to the integration layer.
    }
}

/// Build an audit event from the current clock.
pub fn build_audit_event(
    task_id: TaskId,
    tag: CapabilityTag,
    action: impl Into<String>,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        task_id,
        tag,
        action: action.into(),
        created_at_ms: now_ms(),
        detail,
    }
}
