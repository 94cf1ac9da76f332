//! Broadcast bus for task events.
//!
//! Publishing is non-blocking and best-effort: with no live subscribers
//! the event still counts as published (the persistent recorder is
//! normally the first subscriber). Per-publisher ordering is preserved
//! by the broadcast channel; cross-publisher ordering is not, which is
//! why records carry a (timestamp, seq) pair.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use tokio::sync::broadcast;

use super::types::{TaskEvent, TaskEventRecord};

/// Counters for bus health reporting.
#[derive(Debug, Default)]
pub struct BusMetrics {
    published: AtomicU64,
    lagged_drops: AtomicU64,
}

impl BusMetrics {
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn lagged_drops(&self) -> u64 {
        self.lagged_drops.load(Ordering::Relaxed)
    }

    pub(super) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_lagged(&self, n: u64) {
        self.lagged_drops.fetch_add(n, Ordering::Relaxed);
    }
}

/// Event bus scoped to one crawl task.
pub struct EventBus {
    task_id: String,
    sender: broadcast::Sender<TaskEventRecord>,
    seq: AtomicI64,
    metrics: Arc<BusMetrics>,
}

impl EventBus {
    /// Create a bus for `task_id` with the given buffer capacity.
    #[must_use]
    pub fn new(task_id: impl Into<String>, capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity);
        Arc::new(Self {
            task_id: task_id.into(),
            sender,
            seq: AtomicI64::new(0),
            metrics: Arc::new(BusMetrics::default()),
        })
    }

    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Publish an event. Returns the record as flattened for storage.
    pub fn publish(&self, event: &TaskEvent) -> TaskEventRecord {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let record = TaskEventRecord::from_event(&self.task_id, seq, event);
        self.metrics.record_published();
        if self.sender.send(record.clone()).is_err() {
            debug!("event {} had no live subscribers", record.event_type);
        }
        record
    }

    /// Subscribe to the live stream. Slow subscribers lag and drop.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEventRecord> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<BusMetrics> {
        Arc::clone(&self.metrics)
    }

    pub(super) fn note_lagged(&self, n: u64) {
        self.metrics.record_lagged(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let bus = EventBus::new("task-1", 16);
        let mut rx = bus.subscribe();

        bus.publish(&TaskEvent::DomainLearned {
            host: "example.com".to_string(),
        });

        let record = rx.recv().await.unwrap();
        assert_eq!(record.event_type, "domain.learned");
        assert_eq!(record.task_id, "task-1");
        assert_eq!(record.target.as_deref(), Some("example.com"));
    }

    #[tokio::test]
    async fn test_seq_is_monotonic_per_bus() {
        let bus = EventBus::new("task-2", 16);
        let mut rx = bus.subscribe();
        for _ in 0..3 {
            bus.publish(&TaskEvent::BreakerClosed {
                host: "h.example".to_string(),
            });
        }
        let a = rx.recv().await.unwrap().seq;
        let b = rx.recv().await.unwrap().seq;
        let c = rx.recv().await.unwrap().seq;
        assert!(a < b && b < c);
    }
}
