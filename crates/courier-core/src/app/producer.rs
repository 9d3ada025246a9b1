//! Producer - WorkItem の生成と投入
//!
//! # フロー
//! 1. batch サイズを `[min_batch, max_batch]` から選ぶ
//! 2. ItemSource から payload を取り、WorkItem にして enqueue（満杯なら待つ）
//! 3. `[min_delay, max_delay]` だけ待つ（shutdown と競合）
//! 4. 停止したら queue を close する。close するのは producer だけ

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ProducerConfig;
use crate::domain::{PipelineEvent, WorkItem};
use crate::ports::{EventSink, IdGenerator, ItemSource};
use crate::queue::{EnqueueError, Enqueued, WorkQueue};
use crate::shutdown::CancelSignal;

/// Why the producer loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerStop {
    #[default]
    Cancelled,
    SourceExhausted,
    /// Someone else closed the queue. Should not happen inside a pipeline.
    QueueClosed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProducerReport {
    /// Items built from the source.
    pub generated: u64,
    /// Items that entered the buffer.
    pub accepted: u64,
    /// Items discarded by a drop overflow policy (incoming or evicted).
    pub dropped: u64,
    pub batches: u64,
    pub stop: ProducerStop,
}

pub struct Producer {
    queue: Arc<WorkQueue>,
    source: Box<dyn ItemSource>,
    ids: Arc<dyn IdGenerator>,
    sink: Arc<dyn EventSink>,
    config: ProducerConfig,
    rng: StdRng,
}

impl Producer {
    pub fn new(
        queue: Arc<WorkQueue>,
        source: Box<dyn ItemSource>,
        ids: Arc<dyn IdGenerator>,
        sink: Arc<dyn EventSink>,
        config: ProducerConfig,
    ) -> Self {
        let rng = match config.seed() {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            queue,
            source,
            ids,
            sink,
            config,
            rng,
        }
    }

    /// Produce until cancelled or the source runs dry, then close the queue.
    pub async fn run(mut self, cancel: CancelSignal) -> ProducerReport {
        info!(
            min_batch = self.config.min_batch(),
            max_batch = self.config.max_batch(),
            "producer started"
        );

        let mut report = ProducerReport::default();
        let mut sequence: u64 = 0;

        report.stop = 'production: loop {
            if cancel.is_cancelled() {
                break ProducerStop::Cancelled;
            }

            let batch_id = self.ids.generate_batch_id();
            let batch_size = self
                .rng
                .gen_range(self.config.min_batch()..=self.config.max_batch());

            for _ in 0..batch_size {
                if cancel.is_cancelled() {
                    break 'production ProducerStop::Cancelled;
                }
                let Some(new_item) = self.source.next_item(sequence) else {
                    break 'production ProducerStop::SourceExhausted;
                };
                sequence += 1;
                report.generated += 1;

                let item = WorkItem::new(self.ids.generate_item_id(), new_item.payload)
                    .with_priority(new_item.priority)
                    .with_batch(batch_id);
                let item_id = item.id();
                let priority = item.priority();

                match self.queue.enqueue(item, &cancel).await {
                    Ok(Enqueued::Accepted) => {
                        report.accepted += 1;
                        self.sink.emit(&PipelineEvent::ItemEnqueued {
                            item_id,
                            batch: Some(batch_id),
                            priority,
                        });
                    }
                    Ok(Enqueued::DroppedNewest(dropped)) => {
                        report.dropped += 1;
                        self.emit_dropped(&dropped);
                    }
                    Ok(Enqueued::EvictedOldest(evicted)) => {
                        report.accepted += 1;
                        report.dropped += 1;
                        self.sink.emit(&PipelineEvent::ItemEnqueued {
                            item_id,
                            batch: Some(batch_id),
                            priority,
                        });
                        self.emit_dropped(&evicted);
                    }
                    Err(EnqueueError::Closed(_)) => break 'production ProducerStop::QueueClosed,
                    Err(EnqueueError::Cancelled(_)) => break 'production ProducerStop::Cancelled,
                }
            }

            report.batches += 1;
            debug!(%batch_id, batch_size, "batch produced");

            let delay = self
                .rng
                .gen_range(self.config.min_delay()..=self.config.max_delay());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => break ProducerStop::Cancelled,
            }
        };

        // producer が唯一の close 呼び出し元
        self.queue.close();

        info!(
            generated = report.generated,
            accepted = report.accepted,
            dropped = report.dropped,
            batches = report.batches,
            stop = ?report.stop,
            "producer stopped, queue closed"
        );
        report
    }

    fn emit_dropped(&self, item: &WorkItem) {
        self.sink.emit(&PipelineEvent::ItemDropped {
            item_id: item.id(),
            policy: self.queue.policy(),
        });
    }
}
