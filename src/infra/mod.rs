//! Infrastructure adapters for queue and mailbox backends.

pub mod mailbox;
pub mod queue;

pub use mailbox::{FileMailbox, InMemoryMailbox, PostgresMailbox};
pub use queue::{FileQueue, InMemoryQueue, PostgresQueue};
