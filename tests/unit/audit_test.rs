//! Tests for the in-memory audit sink.

use workcell::core::{build_audit_event, AuditSink, InMemoryAuditSink};
use workcell::util::{CapabilityTag, TaskId};

#[test]
fn records_and_lists_events_in_order() {
    let mut sink = InMemoryAuditSink::new(10);
    let task = TaskId::new();
    let tag = CapabilityTag::new("calc");

    let event = build_audit_event(task, tag.clone(), "submit", Some("payload".into()));
    sink.record(event);

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].task_id, task);
    assert_eq!(events[0].tag, tag);
    assert_eq!(events[0].action, "submit");
    assert_eq!(events[0].detail.as_deref(), Some("payload"));
}

#[test]
fn drops_oldest_once_over_capacity() {
    let mut sink = InMemoryAuditSink::new(2);
    let tag = CapabilityTag::new("calc");
    let (t1, t2, t3) = (TaskId::new(), TaskId::new(), TaskId::new());

    sink.record(build_audit_event(t1, tag.clone(), "submit", None));
    sink.record(build_audit_event(t2, tag.clone(), "submit", None));
    sink.record(build_audit_event(t3, tag, "submit", None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].task_id, t2);
    assert_eq!(events[1].task_id, t3);
}

#[test]
fn build_audit_event_stamps_a_fresh_id_and_clock() {
    let tag = CapabilityTag::new("calc");
    let event = build_audit_event(TaskId::new(), tag, "complete", Some("result".into()));
    assert!(!event.event_id.is_empty());
    assert!(event.created_at_ms > 0);
}
