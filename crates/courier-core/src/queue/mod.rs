//! Queue module: bounded work queue, overflow policy and retry policy.

mod bounded;
mod overflow;
mod retry;

pub use bounded::WorkQueue;
pub use overflow::{OverflowPolicy, ParseOverflowPolicyError};
pub use retry::RetryPolicy;

use crate::domain::WorkItem;

/// Successful `enqueue` result.
#[derive(Debug)]
pub enum Enqueued {
    /// Appended at the tail.
    Accepted,

    /// Buffer was full under `DropNewest`; the incoming item was discarded.
    DroppedNewest(WorkItem),

    /// Buffer was full under `DropOldest`; the incoming item was appended and
    /// this (former head) item was discarded.
    EvictedOldest(WorkItem),
}

impl Enqueued {
    /// The item that was discarded to honour the overflow policy, if any.
    pub fn dropped(&self) -> Option<&WorkItem> {
        match self {
            Self::Accepted => None,
            Self::DroppedNewest(item) | Self::EvictedOldest(item) => Some(item),
        }
    }
}

/// The queue refused an item. Not an exceptional condition: callers branch on it.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("queue is closed")]
    Closed(WorkItem),

    #[error("enqueue cancelled by shutdown")]
    Cancelled(WorkItem),
}

impl EnqueueError {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    pub fn item(&self) -> &WorkItem {
        match self {
            Self::Closed(item) | Self::Cancelled(item) => item,
        }
    }

    pub fn into_item(self) -> WorkItem {
        match self {
            Self::Closed(item) | Self::Cancelled(item) => item,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DequeueError {
    /// Closed and fully drained.
    #[error("queue is closed and drained")]
    Closed,

    #[error("dequeue cancelled by shutdown")]
    Cancelled,
}
