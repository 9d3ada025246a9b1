//! Events - パイプラインで発生したイベント
//!
//! EventSink に渡される構造化イベント。出力先（stdout, file, telemetry）は
//! sink 側の関心事で、core は形だけを決めます。

use serde::Serialize;

use super::{BatchId, WorkItemId};
use crate::observability::MetricsSnapshot;
use crate::queue::OverflowPolicy;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    ItemEnqueued {
        item_id: WorkItemId,
        batch: Option<BatchId>,
        priority: i32,
    },

    /// Discarded by a drop overflow policy.
    ItemDropped {
        item_id: WorkItemId,
        policy: OverflowPolicy,
    },

    ItemProcessed {
        item_id: WorkItemId,
        worker_id: usize,
        retry_count: u32,
    },

    /// A retry was scheduled; `retry_count` is the value after increment.
    ItemRetried {
        item_id: WorkItemId,
        worker_id: usize,
        retry_count: u32,
        delay_ms: u64,
        reason: String,
    },

    ItemFailedPermanently {
        item_id: WorkItemId,
        worker_id: usize,
        retry_count: u32,
        reason: String,
    },

    WorkerStopped {
        worker_id: usize,
        reason: String,
    },

    MetricsSnapshot(MetricsSnapshot),
}

impl PipelineEvent {
    /// Short, stable name used as the log message / metric key.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ItemEnqueued { .. } => "item_enqueued",
            Self::ItemDropped { .. } => "item_dropped",
            Self::ItemProcessed { .. } => "item_processed",
            Self::ItemRetried { .. } => "item_retried",
            Self::ItemFailedPermanently { .. } => "item_failed_permanently",
            Self::WorkerStopped { .. } => "worker_stopped",
            Self::MetricsSnapshot(_) => "metrics_snapshot",
        }
    }

    pub fn item_id(&self) -> Option<WorkItemId> {
        match self {
            Self::ItemEnqueued { item_id, .. }
            | Self::ItemDropped { item_id, .. }
            | Self::ItemProcessed { item_id, .. }
            | Self::ItemRetried { item_id, .. }
            | Self::ItemFailedPermanently { item_id, .. } => Some(*item_id),
            Self::WorkerStopped { .. } | Self::MetricsSnapshot(_) => None,
        }
    }
}
