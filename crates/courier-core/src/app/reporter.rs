//! MetricsReporter - 定期スナップショット
//!
//! - `interval` ごとに counters + queue 長を読み、`MetricsSnapshot` イベントを出す
//! - shutdown 後は tick を止め、worker の終了通知を待ってから final を 1 回だけ出す
//! - 読むだけ。counters を書き換えることはない

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::domain::PipelineEvent;
use crate::observability::{MetricsSnapshot, PipelineCounters};
use crate::ports::{Clock, EventSink};
use crate::queue::WorkQueue;
use crate::shutdown::CancelSignal;

pub struct MetricsReporter {
    queue: Arc<WorkQueue>,
    counters: Arc<PipelineCounters>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(
        queue: Arc<WorkQueue>,
        counters: Arc<PipelineCounters>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            counters,
            sink,
            clock,
            interval,
        }
    }

    /// Current view, not emitted anywhere.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.counters.snapshot(self.queue.len(), self.clock.now())
    }

    /// Tick until cancelled, then emit the final snapshot.
    ///
    /// With `drained` set, the final snapshot waits for that signal (or for
    /// its sender to be dropped) so it reflects the workers' last writes.
    pub async fn run(
        self,
        cancel: CancelSignal,
        drained: Option<oneshot::Receiver<()>>,
    ) -> MetricsSnapshot {
        debug!(
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "metrics reporter started"
        );

        // 初回 tick は interval 後。起動直後の空スナップショットは出さない
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = self.snapshot();
                    self.sink.emit(&PipelineEvent::MetricsSnapshot(snapshot));
                }
            }
        }

        if let Some(drained) = drained {
            // Err は sender drop。どちらにしても worker はもう書かない
            let _ = drained.await;
        }

        let last = self.snapshot().into_final();
        info!(
            enqueued = last.total_enqueued,
            processed = last.total_processed,
            failed = last.total_failed_permanently,
            retried = last.total_retried,
            dropped = last.total_dropped,
            pending = last.pending,
            success_rate = last.success_rate(),
            "final metrics"
        );
        self.sink.emit(&PipelineEvent::MetricsSnapshot(last.clone()));
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{WorkItem, WorkItemId};
    use crate::impls::MemoryEventSink;
    use crate::ports::FixedClock;
    use crate::queue::OverflowPolicy;
    use crate::shutdown::ShutdownCoordinator;
    use chrono::{TimeZone, Utc};

    fn reporter(interval: Duration) -> (MetricsReporter, Arc<WorkQueue>, Arc<MemoryEventSink>) {
        let counters = Arc::new(PipelineCounters::new());
        let queue = Arc::new(WorkQueue::new(10, OverflowPolicy::Block, Arc::clone(&counters)));
        let sink = Arc::new(MemoryEventSink::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let reporter = MetricsReporter::new(
            Arc::clone(&queue),
            counters,
            sink.clone(),
            clock,
            interval,
        );
        (reporter, queue, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn emits_one_snapshot_per_interval() {
        let (reporter, _queue, sink) = reporter(Duration::from_secs(5));
        let sd = ShutdownCoordinator::new();
        let task = tokio::spawn(reporter.run(sd.signal(), None));

        tokio::time::sleep(Duration::from_millis(12_500)).await;
        assert_eq!(sink.snapshots().len(), 2);
        assert!(sink.snapshots().iter().all(|s| !s.is_final));

        sd.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_emits_exactly_one_final_snapshot() {
        let (reporter, queue, sink) = reporter(Duration::from_secs(5));
        let sd = ShutdownCoordinator::new();
        let cancel = sd.signal();

        queue
            .enqueue(WorkItem::new(WorkItemId::generate(), serde_json::json!({})), &cancel)
            .await
            .unwrap();

        let task = tokio::spawn(reporter.run(cancel, None));
        // between ticks
        tokio::time::sleep(Duration::from_millis(7_000)).await;
        sd.cancel();
        let last = task.await.unwrap();

        let snapshots = sink.snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots.iter().filter(|s| s.is_final).count(), 1);
        assert!(snapshots.last().unwrap().is_final);
        assert!(last.is_final);
        assert_eq!(last.total_enqueued, 1);
        assert_eq!(last.pending, 1);
        assert!(last.is_balanced());
    }

    #[tokio::test(start_paused = true)]
    async fn final_snapshot_waits_for_workers_to_drain() {
        let (reporter, queue, sink) = reporter(Duration::from_secs(60));
        let sd = ShutdownCoordinator::new();
        let (drained_tx, drained_rx) = oneshot::channel();

        let task = tokio::spawn(reporter.run(sd.signal(), Some(drained_rx)));
        sd.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!task.is_finished());
        assert!(sink.snapshots().is_empty());

        // worker の最後の書き込みに相当
        queue.counters().record_enqueued();
        queue.counters().record_processed();
        drained_tx.send(()).unwrap();

        let last = task.await.unwrap();
        assert!(last.is_final);
        assert_eq!(last.total_processed, 1);
        assert_eq!(sink.snapshots().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_drain_sender_still_releases_the_final_snapshot() {
        let (reporter, _queue, sink) = reporter(Duration::from_secs(60));
        let sd = ShutdownCoordinator::new();
        let (drained_tx, drained_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(reporter.run(sd.signal(), Some(drained_rx)));
        sd.cancel();
        drop(drained_tx);

        let last = task.await.unwrap();
        assert!(last.is_final);
        assert_eq!(sink.snapshots().len(), 1);
    }
}
