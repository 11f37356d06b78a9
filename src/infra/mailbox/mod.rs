//! Mailbox backends.

pub mod file;
pub mod memory;
pub mod postgres;

pub use file::FileMailbox;
pub use memory::InMemoryMailbox;
pub use postgres::PostgresMailbox;
