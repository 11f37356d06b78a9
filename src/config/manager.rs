//! Root configuration aggregating every pool the manager should bring up.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::pool::PoolConfig;
use crate::util::CapabilityTag;

/// Top-level configuration for a [`crate::core::manager::UnifiedManager`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ManagerConfig {
    /// Per-tag pool configuration. Pools not listed here can still be
    /// created later via `PoolFactory::register_custom_worker_source`.
    pub pools: HashMap<String, PoolConfig>,
    /// Whether to pre-create pools for [`crate::util::builtin_tags`] that
    /// aren't explicitly listed in `pools`, using [`PoolConfig::new`]'s
    /// defaults.
    #[serde(default)]
    pub auto_create_builtin_pools: bool,
    /// Bound on [`crate::core::audit::InMemoryAuditSink`]'s retained events,
    /// when no other sink is configured.
    #[serde(default = "default_audit_capacity")]
    pub audit_capacity: usize,
}

const fn default_audit_capacity() -> usize {
    4096
}

impl ManagerConfig {
    /// Validate every configured pool and the tag/key correspondence.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        for (name, pool) in &self.pools {
            if pool.tag.as_str() != name {
                return Err(format!(
                    "pool map key `{name}` does not match its tag `{}`",
                    pool.tag
                ));
            }
            pool.validate()
                .map_err(|e| format!("pool `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse a configuration from a JSON string and validate it.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse failure or the first violated
    /// constraint.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Insert or replace a pool's configuration, keyed by its tag.
    pub fn with_pool(mut self, config: PoolConfig) -> Self {
        self.pools.insert(config.tag.as_str().to_string(), config);
        self
    }

    /// Look up a pool's configuration by tag.
    #[must_use]
    pub fn pool(&self, tag: &CapabilityTag) -> Option<&PoolConfig> {
        self.pools.get(tag.as_str())
    }
}
