//! Stall detector: notices when the whole crawl stops making progress.
//!
//! Any successful fetch (on any host) beats the heartbeat. If no beat
//! arrives for the configured window, a `crawl.stalled` event carrying
//! a diagnostic dump (queue depth, open breakers, last error per host)
//! is emitted. The detector keeps running after a stall so recovery and
//! re-stall both show up in the stream.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::task::JoinHandle;

use super::breaker::CircuitBreaker;
use super::shutdown::ShutdownSignal;
use crate::events::{EventBus, TaskEvent};
use crate::storage::Storage;

/// Records the time of the most recent successful fetch.
#[derive(Clone, Default)]
pub struct Heartbeat {
    last_beat_ms: Arc<AtomicI64>,
}

impl Heartbeat {
    #[must_use]
    pub fn new() -> Self {
        let hb = Self {
            last_beat_ms: Arc::new(AtomicI64::new(0)),
        };
        hb.beat();
        hb
    }

    pub fn beat(&self) {
        self.last_beat_ms
            .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    #[must_use]
    pub fn idle_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis() - self.last_beat_ms.load(Ordering::Relaxed)
    }
}

/// Spawn the background stall watcher.
pub fn spawn_stall_detector(
    heartbeat: Heartbeat,
    stall_after: Duration,
    breaker: Arc<CircuitBreaker>,
    storage: Storage,
    bus: Arc<EventBus>,
    shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let check_every = (stall_after / 4).max(Duration::from_secs(1));
        let mut already_stalled = false;

        loop {
            if shutdown
                .guard(tokio::time::sleep(check_every))
                .await
                .is_none()
            {
                return;
            }

            let idle_ms = heartbeat.idle_ms();
            if idle_ms < stall_after.as_millis() as i64 {
                already_stalled = false;
                continue;
            }
            if already_stalled {
                continue;
            }
            already_stalled = true;

            let queue_depth = storage.queue_depth().await.unwrap_or(-1);
            let open_breakers = breaker.open_hosts();
            let last_errors = breaker.last_errors();

            warn!(
                "crawl stalled: no successful fetch for {idle_ms}ms \
                 (queue depth {queue_depth}, {} open breakers)",
                open_breakers.len()
            );

            bus.publish(&TaskEvent::CrawlStalled {
                idle_ms,
                queue_depth,
                open_breakers,
                last_errors,
            });
        }
    })
}
