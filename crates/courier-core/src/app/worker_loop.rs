//! WorkerLoop - dequeue → send → decide → (retry | complete | give up)
//!
//! # 状態遷移（1 worker あたり）
//! ```text
//! Idle → Dequeuing ─┬─ Closed / Cancelled → Terminal
//!                   └─ Item → Processing ─┬─ Success → Idle
//!                                         └─ Failure → RetryDecision
//! RetryDecision ─┬─ retry_count <  max_retries → Backoff → requeue → Idle
//!                └─ retry_count >= max_retries → PermanentFailure → Idle
//! ```
//!
//! - 判断（RetryDecision）は `Decider` の純関数、実行はここ
//! - 想定外のエラー / panic はその worker だけを止める。兄弟 worker は続行
//! - 保持中の item は `InFlight` ガードが見張っていて、どの経路で抜けても
//!   「処理済み」か「恒久失敗」のどちらかに必ず数えられる

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::domain::{Decider, Decision, PipelineEvent, SendOutcome, WorkItem, WorkItemId};
use crate::error::CourierError;
use crate::observability::PipelineCounters;
use crate::ports::{EventSink, Sender};
use crate::queue::{DequeueError, EnqueueError, WorkQueue};
use crate::shutdown::CancelSignal;

/// Everything a worker shares with its siblings.
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: Arc<WorkQueue>,
    pub sender: Arc<dyn Sender>,
    pub decider: Arc<dyn Decider>,
    pub sink: Arc<dyn EventSink>,
    pub counters: Arc<PipelineCounters>,
    pub send_timeout: Option<Duration>,
}

/// How a worker loop ended.
#[derive(Debug)]
pub enum WorkerExit {
    /// Queue closed and empty.
    Drained,
    /// Shutdown requested while waiting for work.
    Cancelled,
    /// Unexpected error from the send collaborator.
    Failed(CourierError),
    /// The worker task panicked.
    Panicked,
}

impl WorkerExit {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Panicked)
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drained => f.write_str("queue closed and drained"),
            Self::Cancelled => f.write_str("cancelled while idle"),
            Self::Failed(err) => write!(f, "failed: {err}"),
            Self::Panicked => f.write_str("panicked"),
        }
    }
}

#[derive(Debug)]
pub struct WorkerReport {
    pub worker_id: usize,
    /// Items taken off the queue (each retry attempt counts once).
    pub attempts: u64,
    pub exit: WorkerExit,
}

pub struct Worker {
    id: usize,
    ctx: WorkerContext,
}

impl Worker {
    pub fn new(id: usize, ctx: WorkerContext) -> Self {
        Self { id, ctx }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub async fn run(self, cancel: CancelSignal) -> WorkerReport {
        debug!(worker_id = self.id, "worker started");
        let mut attempts = 0;

        let exit = loop {
            let item = match self.ctx.queue.dequeue(&cancel).await {
                Ok(item) => item,
                Err(DequeueError::Closed) => break WorkerExit::Drained,
                Err(DequeueError::Cancelled) => break WorkerExit::Cancelled,
            };
            attempts += 1;

            if let Err(err) = self.process(item, &cancel).await {
                error!(worker_id = self.id, error = %err, "worker stopping after unexpected error");
                break WorkerExit::Failed(err);
            }
        };

        self.ctx.sink.emit(&PipelineEvent::WorkerStopped {
            worker_id: self.id,
            reason: exit.to_string(),
        });
        debug!(worker_id = self.id, attempts, exit = %exit, "worker stopped");

        WorkerReport {
            worker_id: self.id,
            attempts,
            exit,
        }
    }

    /// One attempt for one item. `Err` only for unexpected errors.
    async fn process(&self, mut item: WorkItem, cancel: &CancelSignal) -> Result<(), CourierError> {
        let mut guard = InFlight::arm(self, &item);

        // `?` で抜けると guard の Drop が恒久失敗として数える
        let outcome = self.attempt(&item).await?;
        let decision = self.ctx.decider.decide(item.retry_count(), &outcome);
        guard.disarm();

        match decision {
            Decision::Complete => {
                self.ctx.counters.record_processed();
                self.ctx.sink.emit(&PipelineEvent::ItemProcessed {
                    item_id: item.id(),
                    worker_id: self.id,
                    retry_count: item.retry_count(),
                });
            }
            Decision::GiveUp { reason } => {
                self.fail_permanently(&item, reason);
            }
            Decision::Retry {
                delay,
                next_retry_count,
                reason,
            } => {
                self.ctx.counters.record_retried();
                self.ctx.sink.emit(&PipelineEvent::ItemRetried {
                    item_id: item.id(),
                    worker_id: self.id,
                    retry_count: next_retry_count,
                    delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    reason,
                });

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        self.fail_permanently(&item, "shutdown during retry backoff".into());
                        return Ok(());
                    }
                }

                item.record_retry();
                debug_assert_eq!(item.retry_count(), next_retry_count);

                if let Err(err) = self.ctx.queue.requeue(item, cancel).await {
                    let reason = match &err {
                        EnqueueError::Closed(_) => "queue closed before retry could be enqueued",
                        EnqueueError::Cancelled(_) => "shutdown while waiting to re-enqueue",
                    };
                    self.fail_permanently(err.item(), reason.into());
                }
            }
        }
        Ok(())
    }

    async fn attempt(&self, item: &WorkItem) -> Result<SendOutcome, CourierError> {
        let Some(limit) = self.ctx.send_timeout else {
            return self.ctx.sender.send(item).await;
        };
        match tokio::time::timeout(limit, self.ctx.sender.send(item)).await {
            Ok(result) => result,
            Err(_) => Ok(SendOutcome::transient(format!(
                "send timed out after {}ms",
                limit.as_millis()
            ))),
        }
    }

    fn fail_permanently(&self, item: &WorkItem, reason: String) {
        self.record_failure(item.id(), item.retry_count(), reason);
    }

    fn record_failure(&self, item_id: WorkItemId, retry_count: u32, reason: String) {
        self.ctx.counters.record_failed_permanently();
        self.ctx.sink.emit(&PipelineEvent::ItemFailedPermanently {
            item_id,
            worker_id: self.id,
            retry_count,
            reason,
        });
    }
}

/// Guard for the send attempt of the item a worker is holding.
///
/// Dropped while still armed (unexpected error, panic unwinding) it counts
/// the item as permanently failed, so the counters stay balanced.
struct InFlight<'a> {
    worker: &'a Worker,
    item_id: WorkItemId,
    retry_count: u32,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn arm(worker: &'a Worker, item: &WorkItem) -> Self {
        Self {
            worker,
            item_id: item.id(),
            retry_count: item.retry_count(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(
            worker_id = self.worker.id,
            item_id = %self.item_id,
            "worker aborted while holding an item, counting it as permanently failed"
        );
        self.worker.record_failure(
            self.item_id,
            self.retry_count,
            "worker aborted while processing".into(),
        );
    }
}

/// Worker pool handle.
/// - 全 worker が同じ `CancelSignal` を見る
/// - `join()` で全 worker の終了を待つ。panic した worker もここで回収する
pub struct WorkerPool {
    joins: Vec<(usize, JoinHandle<WorkerReport>)>,
    sink: Arc<dyn EventSink>,
}

impl WorkerPool {
    /// Spawn `n` workers on the current tokio runtime.
    pub fn spawn(n: usize, ctx: WorkerContext, cancel: &CancelSignal) -> Self {
        let sink = Arc::clone(&ctx.sink);
        let joins = (0..n)
            .map(|worker_id| {
                let worker = Worker::new(worker_id, ctx.clone());
                let cancel = cancel.clone();
                (worker_id, tokio::spawn(worker.run(cancel)))
            })
            .collect();
        Self { joins, sink }
    }

    /// Wait for every worker. Never fails: a panicked worker is reported as
    /// [`WorkerExit::Panicked`].
    pub async fn join(self) -> Vec<WorkerReport> {
        let mut reports = Vec::with_capacity(self.joins.len());
        for (worker_id, join) in self.joins {
            let report = match join.await {
                Ok(report) => report,
                Err(err) => {
                    if err.is_panic() {
                        error!(worker_id, "worker panicked");
                    } else {
                        error!(worker_id, error = %err, "worker task aborted");
                    }
                    self.sink.emit(&PipelineEvent::WorkerStopped {
                        worker_id,
                        reason: WorkerExit::Panicked.to_string(),
                    });
                    WorkerReport {
                        worker_id,
                        attempts: 0,
                        exit: WorkerExit::Panicked,
                    }
                }
            };
            reports.push(report);
        }
        reports
    }
}
