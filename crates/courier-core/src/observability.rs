//! Shared pipeline counters and the snapshot view derived from them.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process-wide counters, shared through `Arc` by producer, queue, workers
/// and reporter. Every field only ever grows.
///
/// `pending` is not stored here: it is the queue length at snapshot time.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    enqueued: AtomicU64,
    processed: AtomicU64,
    failed_permanently: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failed_permanently(&self) {
        self.failed_permanently.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::SeqCst)
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn failed_permanently(&self) -> u64 {
        self.failed_permanently.load(Ordering::SeqCst)
    }

    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Read every counter once. Individual loads are not taken under a
    /// common lock, so a snapshot taken mid-flight may be off by the
    /// operations in progress; at a quiescent point it is exact.
    pub fn snapshot(&self, pending: usize, taken_at: DateTime<Utc>) -> MetricsSnapshot {
        MetricsSnapshot {
            taken_at,
            total_enqueued: self.enqueued(),
            total_processed: self.processed(),
            total_failed_permanently: self.failed_permanently(),
            total_retried: self.retried(),
            total_dropped: self.dropped(),
            pending: pending as u64,
            is_final: false,
        }
    }
}

/// Point-in-time view of the pipeline, emitted by the metrics reporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub total_enqueued: u64,
    pub total_processed: u64,
    pub total_failed_permanently: u64,
    pub total_retried: u64,
    pub total_dropped: u64,
    pub pending: u64,
    #[serde(rename = "final")]
    pub is_final: bool,
}

impl MetricsSnapshot {
    /// `processed / enqueued * 100`, or 0 when nothing was enqueued.
    pub fn success_rate(&self) -> f64 {
        if self.total_enqueued == 0 {
            return 0.0;
        }
        self.total_processed as f64 / self.total_enqueued as f64 * 100.0
    }

    /// `enqueued == processed + failed + dropped + pending`
    ///
    /// Only guaranteed to hold at a quiescent point.
    pub fn is_balanced(&self) -> bool {
        self.total_enqueued
            == self.total_processed + self.total_failed_permanently + self.total_dropped + self.pending
    }

    pub(crate) fn into_final(mut self) -> Self {
        self.is_final = true;
        self
    }
}
