//! Bounded in-memory work queue.
//!
//! # 実装詳細
//! - `Mutex<VecDeque<WorkItem>>` + closed flag を 1 つのロックで守る
//! - `Notify` を 2 本（not_empty / not_full）使って待ち合わせる
//! - ロックは `.await` を跨がない（待つのはロック解放後）
//! - 待ちに入る前に `Notified::enable()` で登録してから状態を確認するので、
//!   確認と待機の間に来た通知を取りこぼさない

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use super::{DequeueError, EnqueueError, Enqueued, OverflowPolicy};
use crate::domain::WorkItem;
use crate::observability::PipelineCounters;
use crate::ports::{Clock, SystemClock};
use crate::shutdown::CancelSignal;

struct QueueState {
    buffer: VecDeque<WorkItem>,
    closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    /// First time into the pipeline: counted and stamped.
    Fresh,
    /// Coming back after a failed attempt: neither counted nor restamped.
    Retry,
}

/// Fixed-capacity FIFO shared by the producer and every worker.
///
/// Safe for any number of concurrent enqueuers and dequeuers; share it via
/// `Arc<WorkQueue>`.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    not_empty: Notify,
    not_full: Notify,
    capacity: usize,
    policy: OverflowPolicy,
    counters: Arc<PipelineCounters>,
    clock: Arc<dyn Clock>,
}

impl WorkQueue {
    /// `capacity` must be > 0; `PipelineConfig` validation guarantees it.
    pub fn new(capacity: usize, policy: OverflowPolicy, counters: Arc<PipelineCounters>) -> Self {
        Self::with_clock(capacity, policy, counters, Arc::new(SystemClock))
    }

    pub fn with_clock(
        capacity: usize,
        policy: OverflowPolicy,
        counters: Arc<PipelineCounters>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        debug_assert!(capacity > 0, "queue capacity must be positive");
        Self {
            state: Mutex::new(QueueState {
                buffer: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            capacity,
            policy,
            counters,
            clock,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn counters(&self) -> &Arc<PipelineCounters> {
        &self.counters
    }

    /// Items currently buffered (the `pending` metric).
    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Admit a fresh item at the tail.
    ///
    /// Under [`OverflowPolicy::Block`] this waits while the buffer is full.
    /// On success `total_enqueued` is incremented and `enqueued_at` stamped.
    /// Once `cancel` has fired nothing new is admitted, even with room to
    /// spare. A rejected item is handed back inside the error.
    pub async fn enqueue(
        &self,
        item: WorkItem,
        cancel: &CancelSignal,
    ) -> Result<Enqueued, EnqueueError> {
        self.push(item, cancel, Admission::Fresh).await
    }

    /// Put a retried item back at the tail.
    ///
    /// Always waits for room, whatever the overflow policy. Does not count
    /// toward `total_enqueued` and keeps the original `enqueued_at`.
    pub async fn requeue(&self, item: WorkItem, cancel: &CancelSignal) -> Result<(), EnqueueError> {
        self.push(item, cancel, Admission::Retry).await.map(|_| ())
    }

    /// Take the head item.
    ///
    /// Buffered items are returned without waiting, even after cancellation,
    /// so a closing queue is always drained. Waits while empty and open.
    /// `Cancelled` is only reported once the buffer has been seen empty
    /// after the signal fired.
    pub async fn dequeue(&self, cancel: &CancelSignal) -> Result<WorkItem, DequeueError> {
        loop {
            let not_empty = self.not_empty.notified();
            tokio::pin!(not_empty);
            not_empty.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(item) = state.buffer.pop_front() {
                    drop(state);
                    self.not_full.notify_one();
                    return Ok(item);
                }
                if state.closed {
                    return Err(DequeueError::Closed);
                }
                // push は同じロックの中で signal を見るので、ここで空なら以降の投入はない
                if cancel.is_cancelled() {
                    return Err(DequeueError::Cancelled);
                }
            }

            tokio::select! {
                biased;
                _ = &mut not_empty => {}
                _ = cancel.cancelled() => {}
            }
        }
    }

    /// Mark the queue closed and wake every waiter.
    ///
    /// Buffered items stay and are still handed out by `dequeue`. Returns
    /// `true` only for the call that actually closed the queue.
    pub fn close(&self) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
        }
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
        true
    }

    async fn push(
        &self,
        mut item: WorkItem,
        cancel: &CancelSignal,
        admission: Admission,
    ) -> Result<Enqueued, EnqueueError> {
        loop {
            let not_full = self.not_full.notified();
            tokio::pin!(not_full);
            not_full.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(EnqueueError::Closed(item));
                }
                if cancel.is_cancelled() {
                    return Err(EnqueueError::Cancelled(item));
                }

                if state.buffer.len() < self.capacity {
                    self.admit(&mut item, admission);
                    state.buffer.push_back(item);
                    drop(state);
                    self.not_empty.notify_one();
                    return Ok(Enqueued::Accepted);
                }

                if admission == Admission::Fresh {
                    match self.policy {
                        OverflowPolicy::Block => {}
                        OverflowPolicy::DropNewest => {
                            self.admit(&mut item, admission);
                            self.counters.record_dropped();
                            return Ok(Enqueued::DroppedNewest(item));
                        }
                        OverflowPolicy::DropOldest => {
                            let evicted = state.buffer.pop_front();
                            self.admit(&mut item, admission);
                            state.buffer.push_back(item);
                            if let Some(evicted) = evicted {
                                self.counters.record_dropped();
                                return Ok(Enqueued::EvictedOldest(evicted));
                            }
                            return Ok(Enqueued::Accepted);
                        }
                    }
                }
            }

            tokio::select! {
                biased;
                _ = &mut not_full => {}
                _ = cancel.cancelled() => return Err(EnqueueError::Cancelled(item)),
            }
        }
    }

    fn admit(&self, item: &mut WorkItem, admission: Admission) {
        if admission == Admission::Fresh {
            item.mark_enqueued(self.clock.now());
            self.counters.record_enqueued();
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // 中身は VecDeque と bool だけなので poison されても整合性は壊れない
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("WorkQueue")
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("len", &state.buffer.len())
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkItemId;
    use crate::ports::FixedClock;
    use crate::shutdown::ShutdownCoordinator;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn item(tag: &str) -> WorkItem {
        WorkItem::new(WorkItemId::generate(), serde_json::json!({ "tag": tag }))
    }

    fn tag(item: &WorkItem) -> &str {
        item.payload()["tag"].as_str().unwrap()
    }

    fn queue(capacity: usize, policy: OverflowPolicy) -> Arc<WorkQueue> {
        Arc::new(WorkQueue::new(capacity, policy, Arc::new(PipelineCounters::new())))
    }

    #[tokio::test]
    async fn dequeue_order_is_fifo() {
        let q = queue(3, OverflowPolicy::Block);
        let sd = ShutdownCoordinator::new();
        let cancel = sd.signal();

        for t in ["A", "B", "C"] {
            q.enqueue(item(t), &cancel).await.unwrap();
        }

        assert_eq!(tag(&q.dequeue(&cancel).await.unwrap()), "A");
        assert_eq!(tag(&q.dequeue(&cancel).await.unwrap()), "B");
        assert_eq!(tag(&q.dequeue(&cancel).await.unwrap()), "C");
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_blocks_the_next_enqueue() {
        let q = queue(3, OverflowPolicy::Block);
        let sd = ShutdownCoordinator::new();
        let cancel = sd.signal();

        for t in ["1", "2", "3"] {
            let r = tokio::time::timeout(Duration::from_millis(1), q.enqueue(item(t), &cancel)).await;
            assert!(matches!(r, Ok(Ok(Enqueued::Accepted))));
        }

        let blocked = {
            let q = Arc::clone(&q);
            let cancel = cancel.clone();
            tokio::spawn(async move { q.enqueue(item("4"), &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());
        assert_eq!(q.len(), 3);

        q.dequeue(&cancel).await.unwrap();
        assert!(matches!(blocked.await.unwrap(), Ok(Enqueued::Accepted)));
        assert_eq!(q.len(), 3);
        assert_eq!(q.counters().enqueued(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_two_scenario_keeps_b_then_c() {
        let q = queue(2, OverflowPolicy::Block);
        let sd = ShutdownCoordinator::new();
        let cancel = sd.signal();

        q.enqueue(item("A"), &cancel).await.unwrap();
        q.enqueue(item("B"), &cancel).await.unwrap();

        let c = {
            let q = Arc::clone(&q);
            let cancel = cancel.clone();
            tokio::spawn(async move { q.enqueue(item("C"), &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!c.is_finished());

        assert_eq!(tag(&q.dequeue(&cancel).await.unwrap()), "A");
        c.await.unwrap().unwrap();

        assert_eq!(tag(&q.dequeue(&cancel).await.unwrap()), "B");
        assert_eq!(tag(&q.dequeue(&cancel).await.unwrap()), "C");
    }

    #[tokio::test]
    async fn closed_and_empty_dequeue_returns_immediately() {
        let q = queue(2, OverflowPolicy::Block);
        let sd = ShutdownCoordinator::new();
        assert!(q.close());

        let r = tokio::time::timeout(Duration::from_millis(10), q.dequeue(&sd.signal())).await;
        assert_eq!(r.unwrap().unwrap_err(), DequeueError::Closed);
    }

    #[tokio::test]
    async fn close_keeps_buffered_items_for_draining() {
        let q = queue(4, OverflowPolicy::Block);
        let sd = ShutdownCoordinator::new();
        let cancel = sd.signal();

        q.enqueue(item("A"), &cancel).await.unwrap();
        q.enqueue(item("B"), &cancel).await.unwrap();
        q.close();

        let err = q.enqueue(item("C"), &cancel).await.unwrap_err();
        assert!(err.is_closed());
        assert_eq!(tag(err.item()), "C");

        assert_eq!(tag(&q.dequeue(&cancel).await.unwrap()), "A");
        assert_eq!(tag(&q.dequeue(&cancel).await.unwrap()), "B");
        assert_eq!(q.dequeue(&cancel).await.unwrap_err(), DequeueError::Closed);
        assert_eq!(q.counters().enqueued(), 2);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let q = queue(1, OverflowPolicy::Block);
        assert!(q.close());
        assert!(!q.close());
        assert!(q.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn close_wakes_blocked_dequeuers_and_enqueuers() {
        let q = queue(1, OverflowPolicy::Block);
        let sd = ShutdownCoordinator::new();
        let cancel = sd.signal();

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let q = Arc::clone(&q);
                let cancel = cancel.clone();
                tokio::spawn(async move { q.dequeue(&cancel).await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        q.close();
        for c in consumers {
            assert_eq!(c.await.unwrap().unwrap_err(), DequeueError::Closed);
        }

        // closed queue with a full buffer: a blocked producer gets its item back
        let q = queue(1, OverflowPolicy::Block);
        q.enqueue(item("A"), &cancel).await.unwrap();
        let producer = {
            let q = Arc::clone(&q);
            let cancel = cancel.clone();
            tokio::spawn(async move { q.enqueue(item("B"), &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.close();
        let err = producer.await.unwrap().unwrap_err();
        assert!(err.is_closed());
        assert_eq!(tag(&err.into_item()), "B");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_releases_blocked_callers() {
        let sd = ShutdownCoordinator::new();
        let cancel = sd.signal();

        let empty = queue(1, OverflowPolicy::Block);
        let full = queue(1, OverflowPolicy::Block);
        full.enqueue(item("A"), &cancel).await.unwrap();

        let consumer = {
            let q = Arc::clone(&empty);
            let cancel = cancel.clone();
            tokio::spawn(async move { q.dequeue(&cancel).await })
        };
        let producer = {
            let q = Arc::clone(&full);
            let cancel = cancel.clone();
            tokio::spawn(async move { q.enqueue(item("B"), &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        sd.cancel();
        assert_eq!(consumer.await.unwrap().unwrap_err(), DequeueError::Cancelled);
        let err = producer.await.unwrap().unwrap_err();
        assert!(!err.is_closed());
        assert_eq!(tag(err.item()), "B");
    }

    #[tokio::test]
    async fn buffered_items_are_served_after_cancellation() {
        let q = queue(2, OverflowPolicy::Block);
        let sd = ShutdownCoordinator::new();
        let cancel = sd.signal();

        q.enqueue(item("A"), &cancel).await.unwrap();
        sd.cancel();

        assert_eq!(tag(&q.dequeue(&cancel).await.unwrap()), "A");
        assert_eq!(q.dequeue(&cancel).await.unwrap_err(), DequeueError::Cancelled);
    }

    #[tokio::test]
    async fn nothing_is_admitted_after_cancellation() {
        let q = queue(4, OverflowPolicy::Block);
        let sd = ShutdownCoordinator::new();
        let cancel = sd.signal();

        q.enqueue(item("A"), &cancel).await.unwrap();
        sd.cancel();

        let err = q.enqueue(item("B"), &cancel).await.unwrap_err();
        assert!(!err.is_closed());
        assert_eq!(tag(err.item()), "B");

        let mut a = q.dequeue(&cancel).await.unwrap();
        a.record_retry();
        let err = q.requeue(a, &cancel).await.unwrap_err();
        assert_eq!(tag(err.item()), "A");

        assert!(q.is_empty());
        assert_eq!(q.counters().enqueued(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn woken_dequeuer_takes_an_item_that_beat_the_signal() {
        let q = queue(2, OverflowPolicy::Block);
        let sd = ShutdownCoordinator::new();
        let cancel = sd.signal();

        let consumer = {
            let q = Arc::clone(&q);
            let cancel = cancel.clone();
            tokio::spawn(async move { q.dequeue(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // the item lands before the signal; the waiter must not report Cancelled
        q.enqueue(item("A"), &cancel).await.unwrap();
        sd.cancel();

        assert_eq!(tag(&consumer.await.unwrap().unwrap()), "A");
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn requeue_goes_to_the_tail_without_recounting() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let counters = Arc::new(PipelineCounters::new());
        let q = WorkQueue::with_clock(
            3,
            OverflowPolicy::Block,
            Arc::clone(&counters),
            Arc::new(FixedClock::new(at)),
        );
        let sd = ShutdownCoordinator::new();
        let cancel = sd.signal();

        q.enqueue(item("A"), &cancel).await.unwrap();
        q.enqueue(item("B"), &cancel).await.unwrap();

        let mut a = q.dequeue(&cancel).await.unwrap();
        assert_eq!(a.enqueued_at(), Some(at));
        a.record_retry();
        q.enqueue(item("C"), &cancel).await.unwrap();
        q.requeue(a, &cancel).await.unwrap();

        // retried A competes with fresh work: it lands behind C
        let order: Vec<_> = [
            q.dequeue(&cancel).await.unwrap(),
            q.dequeue(&cancel).await.unwrap(),
            q.dequeue(&cancel).await.unwrap(),
        ]
        .iter()
        .map(|i| tag(i).to_string())
        .collect();
        assert_eq!(order, ["B", "C", "A"]);
        assert_eq!(counters.enqueued(), 3);
    }

    #[tokio::test]
    async fn drop_newest_discards_the_incoming_item() {
        let q = queue(1, OverflowPolicy::DropNewest);
        let sd = ShutdownCoordinator::new();
        let cancel = sd.signal();

        q.enqueue(item("A"), &cancel).await.unwrap();
        match q.enqueue(item("B"), &cancel).await.unwrap() {
            Enqueued::DroppedNewest(dropped) => assert_eq!(tag(&dropped), "B"),
            other => panic!("expected DroppedNewest, got {other:?}"),
        }

        assert_eq!(tag(&q.dequeue(&cancel).await.unwrap()), "A");
        assert_eq!(q.counters().enqueued(), 2);
        assert_eq!(q.counters().dropped(), 1);
    }

    #[tokio::test]
    async fn drop_oldest_evicts_the_head() {
        let q = queue(2, OverflowPolicy::DropOldest);
        let sd = ShutdownCoordinator::new();
        let cancel = sd.signal();

        q.enqueue(item("A"), &cancel).await.unwrap();
        q.enqueue(item("B"), &cancel).await.unwrap();
        match q.enqueue(item("C"), &cancel).await.unwrap() {
            Enqueued::EvictedOldest(evicted) => assert_eq!(tag(&evicted), "A"),
            other => panic!("expected EvictedOldest, got {other:?}"),
        }

        assert_eq!(tag(&q.dequeue(&cancel).await.unwrap()), "B");
        assert_eq!(tag(&q.dequeue(&cancel).await.unwrap()), "C");
        assert_eq!(q.counters().dropped(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn requeue_waits_even_under_drop_policy() {
        let q = queue(1, OverflowPolicy::DropOldest);
        let sd = ShutdownCoordinator::new();
        let cancel = sd.signal();

        q.enqueue(item("A"), &cancel).await.unwrap();
        let retry = {
            let q = Arc::clone(&q);
            let cancel = cancel.clone();
            tokio::spawn(async move { q.requeue(item("R"), &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!retry.is_finished());

        assert_eq!(tag(&q.dequeue(&cancel).await.unwrap()), "A");
        retry.await.unwrap().unwrap();
        assert_eq!(tag(&q.dequeue(&cancel).await.unwrap()), "R");
        assert_eq!(q.counters().dropped(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_and_consumers_see_every_item_once() {
        let q = queue(4, OverflowPolicy::Block);
        let sd = ShutdownCoordinator::new();
        let cancel = sd.signal();

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let q = Arc::clone(&q);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    for n in 0..50 {
                        q.enqueue(item(&format!("{p}-{n}")), &cancel).await.unwrap();
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let q = Arc::clone(&q);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let mut seen = Vec::new();
                    while let Ok(item) = q.dequeue(&cancel).await {
                        seen.push(tag(&item).to_string());
                    }
                    seen
                })
            })
            .collect();

        for p in producers {
            p.await.unwrap();
        }
        q.close();

        let mut all = Vec::new();
        for c in consumers {
            all.extend(c.await.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 200);
        assert_eq!(q.counters().enqueued(), 200);
        assert!(q.is_empty());
    }
}
