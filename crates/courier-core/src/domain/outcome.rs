//! Outcome model: what a single send attempt reported.
//!
//! Unexpected errors are not an outcome; they travel as `Err(CourierError)`
//! and stop the worker that saw them.

use serde::{Deserialize, Serialize};

/// Result of one call to the send collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendOutcome {
    /// The payload was accepted downstream.
    Delivered,

    /// Retryable failure (timeout, 5xx, connection reset, ...).
    TransientFailure { reason: String },
}

impl SendOutcome {
    pub fn delivered() -> Self {
        Self::Delivered
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self::TransientFailure {
            reason: reason.into(),
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Delivered => None,
            Self::TransientFailure { reason } => Some(reason),
        }
    }
}
