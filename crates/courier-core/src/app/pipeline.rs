//! Pipeline - producer / worker pool / reporter の起動と停止
//!
//! # 停止順序
//! ```text
//! cancel → producer 停止 + queue close → workers が残りを drain して終了
//!        → "workers done" を reporter に通知 → final snapshot
//! ```
//! `shutdown()` は最初に cancel する。`wait()` は有限 source の枯渇を待ってから cancel する。

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::producer::{Producer, ProducerReport};
use crate::app::reporter::MetricsReporter;
use crate::app::worker_loop::{WorkerContext, WorkerPool, WorkerReport};
use crate::config::PipelineConfig;
use crate::domain::Decider;
use crate::error::CourierError;
use crate::observability::{MetricsSnapshot, PipelineCounters};
use crate::ports::{Clock, EventSink, IdGenerator, ItemSource, Sender};
use crate::queue::WorkQueue;
use crate::shutdown::ShutdownCoordinator;

/// A wired pipeline that has not been started yet. Built by
/// [`PipelineBuilder`](crate::app::PipelineBuilder).
pub struct Pipeline {
    pub(crate) config: PipelineConfig,
    pub(crate) sender: Arc<dyn Sender>,
    pub(crate) source: Box<dyn ItemSource>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) decider: Arc<dyn Decider>,
}

impl Pipeline {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Spawn producer, workers and reporter on the current tokio runtime.
    pub fn start(self) -> PipelineHandle {
        let config = self.config;
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let counters = Arc::new(PipelineCounters::new());
        let queue = Arc::new(WorkQueue::with_clock(
            config.capacity(),
            config.overflow_policy(),
            Arc::clone(&counters),
            Arc::clone(&self.clock),
        ));

        info!(
            capacity = config.capacity(),
            workers = config.worker_count(),
            max_retries = config.max_retries(),
            overflow_policy = %config.overflow_policy(),
            "pipeline starting"
        );

        let producer = Producer::new(
            Arc::clone(&queue),
            self.source,
            self.ids,
            Arc::clone(&self.sink),
            config.producer().clone(),
        );
        let producer = tokio::spawn(producer.run(coordinator.signal()));

        let ctx = WorkerContext {
            queue: Arc::clone(&queue),
            sender: self.sender,
            decider: self.decider,
            sink: Arc::clone(&self.sink),
            counters: Arc::clone(&counters),
            send_timeout: config.send_timeout(),
        };
        let workers = WorkerPool::spawn(config.worker_count(), ctx, &coordinator.signal());

        let (drained_tx, drained_rx) = oneshot::channel();
        let reporter = MetricsReporter::new(
            Arc::clone(&queue),
            Arc::clone(&counters),
            self.sink,
            Arc::clone(&self.clock),
            config.metrics_interval(),
        );
        let reporter = tokio::spawn(reporter.run(coordinator.signal(), Some(drained_rx)));

        PipelineHandle {
            coordinator,
            queue,
            counters,
            clock: self.clock,
            producer,
            workers,
            drained: drained_tx,
            reporter,
        }
    }
}

/// Everything the pipeline reports once it has stopped.
#[derive(Debug)]
pub struct PipelineReport {
    pub producer: ProducerReport,
    pub workers: Vec<WorkerReport>,
    pub final_snapshot: MetricsSnapshot,
}

impl PipelineReport {
    pub fn failed_workers(&self) -> impl Iterator<Item = &WorkerReport> {
        self.workers.iter().filter(|w| w.exit.is_failure())
    }
}

/// Handle to a running pipeline.
pub struct PipelineHandle {
    coordinator: Arc<ShutdownCoordinator>,
    queue: Arc<WorkQueue>,
    counters: Arc<PipelineCounters>,
    clock: Arc<dyn Clock>,
    producer: JoinHandle<ProducerReport>,
    workers: WorkerPool,
    drained: oneshot::Sender<()>,
    reporter: JoinHandle<MetricsSnapshot>,
}

impl PipelineHandle {
    /// Shared coordinator, e.g. for a signal handler that outlives `wait()`.
    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Request shutdown without waiting for it.
    pub fn cancel(&self) {
        self.coordinator.cancel();
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    pub fn counters(&self) -> &Arc<PipelineCounters> {
        &self.counters
    }

    /// Live snapshot; not emitted to the event sink.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.counters.snapshot(self.queue.len(), self.clock.now())
    }

    /// Cancel, then drain and join everything.
    pub async fn shutdown(self) -> Result<PipelineReport, CourierError> {
        info!("pipeline shutdown requested");
        self.coordinator.cancel();
        self.wait().await
    }

    /// Wait for the producer to stop on its own (finite source, or an
    /// external `cancel()`), drain the workers, then collect the final
    /// snapshot.
    pub async fn wait(self) -> Result<PipelineReport, CourierError> {
        let producer = self.producer.await;
        if let Err(err) = &producer {
            // queue を close しないと worker が永遠に待つ
            error!(error = %err, "producer task failed, closing queue");
            self.queue.close();
        }

        let workers = self.workers.join().await;

        // 有限 source の場合はここで初めて cancel される。reporter の tick を止める
        self.coordinator.cancel();
        let _ = self.drained.send(());

        let final_snapshot = self
            .reporter
            .await
            .map_err(|err| CourierError::Join(format!("metrics reporter: {err}")))?;
        let producer = producer.map_err(|err| CourierError::Join(format!("producer: {err}")))?;

        info!(
            processed = final_snapshot.total_processed,
            failed = final_snapshot.total_failed_permanently,
            "pipeline stopped"
        );

        Ok(PipelineReport {
            producer,
            workers,
            final_snapshot,
        })
    }
}
