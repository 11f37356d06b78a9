//! Tests for the `SchedulerError` taxonomy.

use workcell::core::SchedulerError;
use workcell::util::{CapabilityTag, TaskId, WorkerId};

#[test]
fn queue_full_formats_with_context() {
    let err = SchedulerError::QueueFull("max queue depth 10 reached".to_string());
    assert_eq!(format!("{err}"), "queue full: max queue depth 10 reached");
}

#[test]
fn capacity_exceeded_is_not_retryable() {
    assert!(!SchedulerError::CapacityExceeded.is_retryable());
}

#[test]
fn unknown_operation_is_not_retryable() {
    assert!(!SchedulerError::UnknownOperation("bogus".to_string()).is_retryable());
}

#[test]
fn worker_crash_is_retryable() {
    let err = SchedulerError::WorkerCrash { worker: WorkerId::new(), task: TaskId::new() };
    assert!(err.is_retryable());
}

#[test]
fn timeout_is_retryable() {
    assert!(SchedulerError::Timeout(TaskId::new()).is_retryable());
}

#[test]
fn worker_error_follows_its_own_retryable_hint() {
    let transient = SchedulerError::WorkerError { message: "flaky".into(), retryable: true };
    let fatal = SchedulerError::WorkerError { message: "bad input".into(), retryable: false };
    assert!(transient.is_retryable());
    assert!(!fatal.is_retryable());
}

#[test]
fn cancelled_is_never_retried() {
    assert!(!SchedulerError::Cancelled(TaskId::new()).is_retryable());
}

#[test]
fn pool_already_active_formats_with_tag() {
    let err = SchedulerError::PoolAlreadyActive(CapabilityTag::new("image"));
    assert_eq!(format!("{err}"), "pool already active for tag: image");
}

#[test]
fn backend_error_formats_with_context() {
    let err = SchedulerError::Backend("connection failed".to_string());
    assert_eq!(format!("{err}"), "backend error: connection failed");
}
