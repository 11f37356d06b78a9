//! Configuration models for pools, backends, and deployment overrides.

pub mod env;
pub mod manager;
pub mod pool;

pub use manager::ManagerConfig;
pub use pool::{MailboxBackendConfig, PoolConfig, QueueBackendConfig, RuntimeKind};
