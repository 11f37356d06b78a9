//! Environment-variable overrides for [`crate::config::manager::ManagerConfig`].
//!
//! Loads a `.env` file if present (via `dotenvy`, silently ignoring a
//! missing file) and reads a handful of `WORKCELL_*` variables useful for
//! container deployments where shipping a full JSON config is inconvenient.

use std::env;
use std::time::Duration;

use crate::config::manager::ManagerConfig;
use crate::config::pool::{PoolConfig, RuntimeKind};
use crate::util::builtin_tags;

/// Load `.env` (if present) and build a [`ManagerConfig`] from `WORKCELL_*`
/// variables, falling back to built-in defaults for anything unset.
///
/// Recognized variables:
/// - `WORKCELL_DEFAULT_MAX_WORKERS` — worker ceiling applied to every
///   auto-created builtin pool.
/// - `WORKCELL_DEFAULT_IDLE_TIMEOUT_SECS` — idle eviction timeout applied
///   the same way.
/// - `WORKCELL_AUTO_CREATE_BUILTIN_POOLS` — `"true"`/`"false"`.
#[must_use]
pub fn load() -> ManagerConfig {
    let _ = dotenvy::dotenv();

    let max_workers = env::var("WORKCELL_DEFAULT_MAX_WORKERS")
        .ok()
        .and_then(|v| v.parse().ok());
    let idle_timeout = env::var("WORKCELL_DEFAULT_IDLE_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs);
    let auto_create = env::var("WORKCELL_AUTO_CREATE_BUILTIN_POOLS")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    let mut config = ManagerConfig {
        auto_create_builtin_pools: auto_create,
        ..ManagerConfig::default()
    };

    if auto_create {
        for tag in [
            builtin_tags::IMAGE,
            builtin_tags::DATA,
            builtin_tags::CALC,
            builtin_tags::MONITOR,
        ] {
            let mut pool = PoolConfig::new(tag);
            if let Some(max) = max_workers {
                pool.max_workers = max;
            }
            if let Some(timeout) = idle_timeout {
                pool.idle_timeout = timeout;
            }
            pool.runtime = RuntimeKind::default();
            config = config.with_pool(pool);
        }
    }

    config
}
