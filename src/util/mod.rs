//! Shared utilities: clocks, identifiers, and telemetry bootstrap.

pub mod clock;
pub mod ids;
pub mod telemetry;

pub use clock::now_ms;
pub use ids::{builtin_tags, CapabilityTag, StreamId, TaskId, WorkerId};
pub use telemetry::init_tracing;
