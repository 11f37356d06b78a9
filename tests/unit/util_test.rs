//! Tests for shared identifiers, priority ordering, and the clock helper.

use workcell::core::Priority;
use workcell::util::{builtin_tags, now_ms, CapabilityTag, TaskId, WorkerId};

#[test]
fn priority_orders_critical_first() {
    assert!(Priority::Critical < Priority::High);
    assert!(Priority::High < Priority::Normal);
    assert!(Priority::Normal < Priority::Low);
    assert!(Priority::Low < Priority::Background);
}

#[test]
fn priority_default_is_normal() {
    assert_eq!(Priority::default(), Priority::Normal);
}

#[test]
fn capability_tag_wraps_arbitrary_strings() {
    let tag = CapabilityTag::new("image");
    assert_eq!(tag.as_str(), "image");
    assert_eq!(tag, CapabilityTag::from("image"));
}

#[test]
fn builtin_tags_are_distinct() {
    let tags = [
        builtin_tags::IMAGE,
        builtin_tags::DATA,
        builtin_tags::CALC,
        builtin_tags::MONITOR,
    ];
    for (i, a) in tags.iter().enumerate() {
        for (j, b) in tags.iter().enumerate() {
            if i != j {
                assert_ne!(a, b);
            }
        }
    }
}

#[test]
fn task_and_worker_ids_are_fresh_each_time() {
    assert_ne!(TaskId::new(), TaskId::new());
    assert_ne!(WorkerId::new(), WorkerId::new());
}

#[test]
fn now_ms_is_monotonic_enough_to_be_nonzero_and_increasing() {
    let first = now_ms();
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = now_ms();
    assert!(first > 0);
    assert!(second >= first);
}
