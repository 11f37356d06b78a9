//! Stable identifiers used across the pool, dispatcher, and stream manager.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(TaskId, "Stable identifier for a submitted task.");
uuid_id!(WorkerId, "Stable identifier for a spawned worker.");
uuid_id!(StreamId, "Stable identifier for a long-lived event stream.");

/// Opaque capability tag identifying a kind of worker (`"image"`, `"calc"`, ...).
///
/// Tags are an open string set: any caller may register a new one via
/// [`crate::core::factory::PoolFactory::register_custom_worker_source`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CapabilityTag(String);

impl CapabilityTag {
    /// Wrap an arbitrary string as a capability tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Borrow the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapabilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CapabilityTag {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CapabilityTag {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Built-in capability tags the manager pre-registers when
/// `auto_create_pools` is enabled. Nothing in the core treats these
/// specially beyond that bootstrap step.
pub mod builtin_tags {
    /// Image-processing pool.
    pub const IMAGE: &str = "image";
    /// Data-transformation pool.
    pub const DATA: &str = "data";
    /// Numeric/calculation pool.
    pub const CALC: &str = "calc";
    /// Pool reserved for monitor-originated maintenance work.
    pub const MONITOR: &str = "monitor";
}
