//! In-memory and no-op sinks.

use std::sync::{Mutex, PoisonError};

use crate::domain::PipelineEvent;
use crate::observability::MetricsSnapshot;
use crate::ports::EventSink;

/// Keeps every event in emission order. Handy for tests and for embedding
/// the pipeline somewhere that wants to inspect what happened.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded events with the given [`PipelineEvent::name`].
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }

    pub fn snapshots(&self) -> Vec<MetricsSnapshot> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::MetricsSnapshot(snap) => Some(snap),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &PipelineEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_counts_by_name() {
        let sink = MemoryEventSink::new();
        sink.emit(&PipelineEvent::WorkerStopped {
            worker_id: 0,
            reason: "queue closed".into(),
        });
        sink.emit(&PipelineEvent::WorkerStopped {
            worker_id: 1,
            reason: "queue closed".into(),
        });

        assert_eq!(sink.count("worker_stopped"), 2);
        assert_eq!(sink.count("item_processed"), 0);
        assert!(sink.snapshots().is_empty());
    }
}
