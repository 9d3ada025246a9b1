//! What `enqueue` does when the buffer is full.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Overflow policy for fresh items.
///
/// Retried items always wait for room regardless of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Producer waits until a worker frees a slot (backpressure).
    #[default]
    Block,

    /// The incoming item is discarded.
    DropNewest,

    /// The oldest buffered item is evicted to make room.
    DropOldest,
}

impl OverflowPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::DropNewest => "drop_newest",
            Self::DropOldest => "drop_oldest",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown overflow policy `{0}` (expected block, drop_newest or drop_oldest)")]
pub struct ParseOverflowPolicyError(String);

impl FromStr for OverflowPolicy {
    type Err = ParseOverflowPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "block" => Ok(Self::Block),
            "drop_newest" => Ok(Self::DropNewest),
            "drop_oldest" => Ok(Self::DropOldest),
            _ => Err(ParseOverflowPolicyError(s.to_string())),
        }
    }
}
