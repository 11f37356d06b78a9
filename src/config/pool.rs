//! Per-pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::CapabilityTag;

/// Execution strategy for a pool's worker slots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    /// Dedicated OS thread per slot (`adapter::thread::ThreadSlot`).
    /// The default for CPU-bound worker sources.
    Thread,
    /// Cooperative tokio task per slot (`adapter::task::TaskSlot`).
    /// Appropriate for lightweight or already-async worker sources.
    Task,
}

impl Default for RuntimeKind {
    fn default() -> Self {
        Self::Thread
    }
}

/// Queue backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackendConfig {
    /// In-memory priority heap. Default.
    InMemory,
    /// JSON-lines file, for durability across restarts.
    File {
        /// Directory holding the backing file.
        path: String,
    },
    /// Postgres-backed (schema-only; not wired to a client).
    Postgres,
}

impl Default for QueueBackendConfig {
    fn default() -> Self {
        Self::InMemory
    }
}

/// Outcome-store backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailboxBackendConfig {
    /// In-memory map. Default.
    InMemory,
    /// JSON-lines file, for durability across restarts.
    File {
        /// Directory holding the backing file.
        path: String,
    },
    /// Postgres-backed (schema-only; not wired to a client).
    Postgres,
}

impl Default for MailboxBackendConfig {
    fn default() -> Self {
        Self::InMemory
    }
}

/// Configuration for one capability tag's pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Capability tag this pool serves.
    pub tag: CapabilityTag,
    /// Worker count never drops below this, even when idle.
    pub min_workers: usize,
    /// Worker count never grows past this.
    pub max_workers: usize,
    /// Maximum tasks queued before [`crate::core::error::SchedulerError::QueueFull`].
    pub max_queue_depth: usize,
    /// How long a worker may sit idle before [`crate::core::pool::WorkerPool::evict_idle`]
    /// terminates it, subject to `min_workers`.
    #[serde(with = "humantime_secs")]
    pub idle_timeout: Duration,
    /// Default task timeout when a submission does not specify one.
    #[serde(with = "humantime_secs")]
    pub default_timeout: Duration,
    /// Execution strategy for this pool's slots.
    pub runtime: RuntimeKind,
    /// Queue backend.
    #[serde(default)]
    pub queue: QueueBackendConfig,
    /// Outcome-store backend.
    #[serde(default)]
    pub mailbox: MailboxBackendConfig,
}

impl PoolConfig {
    /// Construct a pool configuration with commonly-sensible defaults,
    /// sized to the host's CPU count.
    #[must_use]
    pub fn new(tag: impl Into<CapabilityTag>) -> Self {
        let cpus = num_cpus::get().max(1);
        Self {
            tag: tag.into(),
            min_workers: 1,
            max_workers: cpus,
            max_queue_depth: 1024,
            idle_timeout: Duration::from_secs(60),
            default_timeout: Duration::from_secs(30),
            runtime: RuntimeKind::default(),
            queue: QueueBackendConfig::default(),
            mailbox: MailboxBackendConfig::default(),
        }
    }

    /// Validate internal consistency.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_workers == 0 {
            return Err("max_workers must be greater than 0".into());
        }
        if self.min_workers > self.max_workers {
            return Err("min_workers must not exceed max_workers".into());
        }
        if self.max_queue_depth == 0 {
            return Err("max_queue_depth must be greater than 0".into());
        }
        if self.default_timeout.is_zero() {
            return Err("default_timeout must be greater than 0".into());
        }
        Ok(())
    }
}

mod humantime_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
