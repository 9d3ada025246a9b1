use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BatchId, WorkItemId};

/// One unit of pending work.
///
/// Ownership: created by the producer, then held by exactly one party at a
/// time (the queue buffer, or the worker that dequeued it). Only the holding
/// worker mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    id: WorkItemId,
    batch: Option<BatchId>,
    payload: serde_json::Value,
    priority: i32,
    enqueued_at: Option<DateTime<Utc>>,
    retry_count: u32,
}

impl WorkItem {
    pub fn new(id: WorkItemId, payload: serde_json::Value) -> Self {
        Self {
            id,
            batch: None,
            payload,
            priority: 0,
            enqueued_at: None,
            retry_count: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_batch(mut self, batch: BatchId) -> Self {
        self.batch = Some(batch);
        self
    }

    pub fn id(&self) -> WorkItemId {
        self.id
    }

    pub fn batch(&self) -> Option<BatchId> {
        self.batch
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Informational only. The queue is FIFO and never looks at this.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Time of the first successful enqueue. Not refreshed on retry.
    pub fn enqueued_at(&self) -> Option<DateTime<Utc>> {
        self.enqueued_at
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Stamp the first-enqueue time. A second call is a no-op.
    pub(crate) fn mark_enqueued(&mut self, at: DateTime<Utc>) {
        if self.enqueued_at.is_none() {
            self.enqueued_at = Some(at);
        }
    }

    /// Count one more retry (called by the worker right before re-enqueue).
    pub(crate) fn record_retry(&mut self) {
        self.retry_count += 1;
    }
}
