//! Tests for pool and manager configuration validation.

use workcell::config::pool::{MailboxBackendConfig, PoolConfig, QueueBackendConfig, RuntimeKind};
use workcell::config::ManagerConfig;
use workcell::util::CapabilityTag;

fn base_config() -> PoolConfig {
    let mut config = PoolConfig::new(CapabilityTag::new("calc"));
    config.min_workers = 1;
    config.max_workers = 4;
    config.max_queue_depth = 50;
    config
}

#[test]
fn valid_pool_config_passes() {
    assert!(base_config().validate().is_ok());
}

#[test]
fn rejects_zero_max_workers() {
    let mut config = base_config();
    config.max_workers = 0;
    assert!(config.validate().is_err());
}

#[test]
fn rejects_min_workers_above_max() {
    let mut config = base_config();
    config.min_workers = 10;
    config.max_workers = 2;
    assert!(config.validate().is_err());
}

#[test]
fn rejects_zero_queue_depth() {
    let mut config = base_config();
    config.max_queue_depth = 0;
    assert!(config.validate().is_err());
}

#[test]
fn rejects_zero_default_timeout() {
    let mut config = base_config();
    config.default_timeout = std::time::Duration::ZERO;
    assert!(config.validate().is_err());
}

#[test]
fn defaults_select_in_memory_backends_and_thread_runtime() {
    let config = PoolConfig::new(CapabilityTag::new("calc"));
    assert!(matches!(config.queue, QueueBackendConfig::InMemory));
    assert!(matches!(config.mailbox, MailboxBackendConfig::InMemory));
    assert!(matches!(config.runtime, RuntimeKind::Thread));
}

#[test]
fn manager_config_with_pool_round_trips_by_tag() {
    let tag = CapabilityTag::new("calc");
    let config = ManagerConfig::default().with_pool(base_config());
    assert!(config.pool(&tag).is_some());
    assert!(config.validate().is_ok());
}

#[test]
fn manager_config_rejects_mismatched_tag_key() {
    let mut config = ManagerConfig::default();
    config.pools.insert("wrong-key".to_string(), base_config());
    assert!(config.validate().is_err());
}

#[test]
fn manager_config_parses_from_json() {
    let json = r#"{
        "pools": {
            "calc": {
                "tag": "calc",
                "min_workers": 1,
                "max_workers": 4,
                "max_queue_depth": 50,
                "idle_timeout": 60,
                "default_timeout": 30,
                "runtime": "thread"
            }
        },
        "auto_create_builtin_pools": false
    }"#;

    let config = ManagerConfig::from_json_str(json).expect("parses");
    assert!(config.pool(&CapabilityTag::new("calc")).is_some());
}
