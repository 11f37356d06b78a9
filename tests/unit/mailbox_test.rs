//! Tests for mailbox backends.

use workcell::core::{Mailbox, TaskOutcome};
use workcell::infra::mailbox::memory::InMemoryMailbox;
use workcell::util::TaskId;

#[test]
fn deliver_then_fetch() {
    let mut mailbox = InMemoryMailbox::new();
    let id = TaskId::new();

    mailbox.deliver(id, TaskOutcome::Completed(vec![1, 2, 3])).expect("deliver");

    match mailbox.fetch(id) {
        Some(TaskOutcome::Completed(payload)) => assert_eq!(payload, vec![1, 2, 3]),
        other => panic!("expected Completed, got {other:?}"),
    }
}

#[test]
fn fetch_on_unknown_task_is_none() {
    let mailbox = InMemoryMailbox::new();
    assert!(mailbox.fetch(TaskId::new()).is_none());
}

#[test]
fn remove_clears_the_slot() {
    let mut mailbox = InMemoryMailbox::new();
    let id = TaskId::new();
    mailbox.deliver(id, TaskOutcome::Cancelled).expect("deliver");

    assert!(mailbox.remove(id).is_some());
    assert!(mailbox.fetch(id).is_none());
    assert!(mailbox.remove(id).is_none());
}

#[test]
fn file_mailbox_persists_across_reopen() {
    let dir = std::env::temp_dir().join(format!("workcell-mailbox-test-{}", TaskId::new()));
    let id = TaskId::new();

    {
        let mut mailbox =
            workcell::infra::mailbox::file::FileMailbox::new(&dir, "calc").expect("open");
        mailbox.deliver(id, TaskOutcome::Completed(vec![9])).expect("deliver");
    }

    let reopened = workcell::infra::mailbox::file::FileMailbox::new(&dir, "calc").expect("reopen");
    match reopened.fetch(id) {
        Some(TaskOutcome::Completed(payload)) => assert_eq!(payload, vec![9]),
        other => panic!("expected Completed, got {other:?}"),
    }

    let _ = std::fs::remove_dir_all(&dir);
}
