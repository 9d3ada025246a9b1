//! TracingEventSink - パイプラインイベントを tracing に流す
//!
//! 出力先（stdout / file / OTLP など）は subscriber 側で決まる。

use tracing::{debug, info, warn};

use crate::domain::PipelineEvent;
use crate::ports::EventSink;

/// Logs every event as a structured `tracing` record under the
/// `courier::events` target.
///
/// Per-item success/enqueue events go to `debug`, retries and drops to
/// `info`/`warn`, metrics snapshots to `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::ItemEnqueued {
                item_id,
                batch,
                priority,
            } => {
                let batch = batch.map(|b| b.to_string()).unwrap_or_default();
                debug!(target: "courier::events", %item_id, %batch, priority, "item enqueued");
            }
            PipelineEvent::ItemDropped { item_id, policy } => {
                warn!(target: "courier::events", %item_id, %policy, "item dropped by overflow policy");
            }
            PipelineEvent::ItemProcessed {
                item_id,
                worker_id,
                retry_count,
            } => {
                debug!(target: "courier::events", %item_id, worker_id, retry_count, "item processed");
            }
            PipelineEvent::ItemRetried {
                item_id,
                worker_id,
                retry_count,
                delay_ms,
                reason,
            } => {
                info!(
                    target: "courier::events",
                    %item_id, worker_id, retry_count, delay_ms, %reason,
                    "item scheduled for retry"
                );
            }
            PipelineEvent::ItemFailedPermanently {
                item_id,
                worker_id,
                retry_count,
                reason,
            } => {
                warn!(
                    target: "courier::events",
                    %item_id, worker_id, retry_count, %reason,
                    "item failed permanently"
                );
            }
            PipelineEvent::WorkerStopped { worker_id, reason } => {
                info!(target: "courier::events", worker_id, %reason, "worker stopped");
            }
            PipelineEvent::MetricsSnapshot(snap) => {
                info!(
                    target: "courier::events",
                    enqueued = snap.total_enqueued,
                    processed = snap.total_processed,
                    failed = snap.total_failed_permanently,
                    retried = snap.total_retried,
                    dropped = snap.total_dropped,
                    pending = snap.pending,
                    success_rate = format_args!("{:.1}", snap.success_rate()),
                    is_final = snap.is_final,
                    "metrics snapshot"
                );
            }
        }
    }
}
