//! Holding pen for breaker-deferred items.
//!
//! When a host's circuit is open its URLs park here instead of being
//! discarded. `drain_ready` hands back every item whose host is
//! attemptable again; the `should_attempt` check doubles as the
//! Open → HalfOpen transition trigger once the retry window passes.

use std::sync::Arc;

use dashmap::DashMap;
use log::info;

use super::manager::CrawlItem;
use crate::resilience::CircuitBreaker;

pub struct DeferredQueue {
    /// host → parked items
    items: DashMap<String, Vec<CrawlItem>>,
    breaker: Arc<CircuitBreaker>,
}

impl DeferredQueue {
    #[must_use]
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            items: DashMap::new(),
            breaker,
        }
    }

    /// Park an item rejected by an open circuit.
    pub fn add(&self, item: CrawlItem) {
        self.items.entry(item.host.clone()).or_default().push(item);
    }

    /// Items whose hosts have recovered.
    pub fn drain_ready(&self) -> Vec<CrawlItem> {
        let mut ready_hosts = Vec::new();
        for entry in self.items.iter() {
            if self.breaker.should_attempt(entry.key()) {
                ready_hosts.push(entry.key().clone());
            }
        }

        let mut ready = Vec::new();
        for host in ready_hosts {
            if let Some((_, items)) = self.items.remove(&host) {
                info!(
                    "breaker recovery: re-queueing {} URLs for {host}",
                    items.len()
                );
                ready.extend(items);
            }
        }
        ready
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.iter().map(|e| e.value().len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::UrlKind;
    use crate::resilience::BreakerConfig;
    use std::time::Duration;

    fn item(url: &str, host: &str) -> CrawlItem {
        CrawlItem {
            url: url.to_string(),
            host: host.to_string(),
            url_id: 1,
            kind: UrlKind::Unknown,
            priority: 1.0,
            retry_count: 0,
            cache_replay: false,
        }
    }

    #[test]
    fn test_drain_waits_for_breaker() {
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            base_retry_window: Duration::from_millis(50),
            max_retry_window: Duration::from_secs(1),
            jitter: 0.0,
        }));
        breaker.record_failure("down.example", "reset");

        let deferred = DeferredQueue::new(Arc::clone(&breaker));
        deferred.add(item("https://down.example/a", "down.example"));
        assert!(deferred.drain_ready().is_empty());
        assert_eq!(deferred.len(), 1);

        std::thread::sleep(Duration::from_millis(70));
        let ready = deferred.drain_ready();
        assert_eq!(ready.len(), 1);
        assert!(deferred.is_empty());
    }
}
