//! Per-host politeness scheduler.
//!
//! Each host owns a token slot (concurrency cap, default 1) and an
//! adaptive inter-request delay. `acquire` suspends the caller until a
//! slot is free and the host's next-ready time has passed; the returned
//! lease is single-use and releases the slot on drop.
//!
//! The delay adapts to what the server tells us: a 429/503 doubles it
//! (capped), a streak of successes halves it back toward the learned
//! floor. A robots `Crawl-delay` raises the floor itself.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::debug;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Minimum inter-request delay per host.
    pub min_delay: Duration,
    /// Hard cap on the adaptive delay.
    pub max_delay: Duration,
    /// Multiplier applied on 429/503.
    pub backoff_factor: f64,
    /// Consecutive successes needed before the delay halves.
    pub recovery_successes: u32,
    /// Concurrent in-flight requests allowed per host.
    pub per_host_concurrency: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(120),
            backoff_factor: 2.0,
            recovery_successes: 5,
            per_host_concurrency: 1,
        }
    }
}

#[derive(Debug)]
struct HostPacing {
    /// Current adaptive inter-request delay.
    current_delay: Duration,
    /// Learned floor: max(config min, robots Crawl-delay).
    floor_delay: Duration,
    /// Earliest time the next request may start.
    next_ready: Instant,
    consecutive_successes: u32,
}

struct HostState {
    pacing: Mutex<HostPacing>,
    slots: Arc<Semaphore>,
}

/// Per-host token-bucket politeness scheduler.
pub struct PolitenessScheduler {
    hosts: DashMap<String, Arc<HostState>>,
    config: RateLimiterConfig,
}

/// A single-use permission to issue one request to a host.
///
/// Holding the lease keeps the host's concurrency slot occupied; drop
/// it when the request completes (success or failure).
pub struct PolitenessLease {
    _permit: OwnedSemaphorePermit,
    host: String,
}

impl PolitenessLease {
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl PolitenessScheduler {
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            hosts: DashMap::new(),
            config,
        }
    }

    fn host_state(&self, host: &str) -> Arc<HostState> {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(HostState {
                    pacing: Mutex::new(HostPacing {
                        current_delay: self.config.min_delay,
                        floor_delay: self.config.min_delay,
                        next_ready: Instant::now(),
                        consecutive_successes: 0,
                    }),
                    slots: Arc::new(Semaphore::new(self.config.per_host_concurrency)),
                })
            })
            .clone()
    }

    /// Acquire a politeness token for `host`, suspending until both a
    /// concurrency slot and the host's next-ready time allow it.
    pub async fn acquire(&self, host: &str) -> PolitenessLease {
        let state = self.host_state(host);

        // Slot first: with the default per-host concurrency of 1 this
        // serializes requests, making the next_ready reservation exact.
        let permit = state
            .slots
            .clone()
            .acquire_owned()
            .await
            .expect("politeness semaphore never closed");

        let wait_until = {
            let mut pacing = state.pacing.lock().await;
            let now = Instant::now();
            let start_at = pacing.next_ready.max(now);
            pacing.next_ready = start_at + pacing.current_delay;
            start_at
        };

        tokio::time::sleep_until(wait_until).await;

        PolitenessLease {
            _permit: permit,
            host: host.to_string(),
        }
    }

    /// Fold in a rate-limit response (429/503). Returns the new delay
    /// so callers can emit a `rate.backoff` event.
    pub async fn record_rate_limited(&self, host: &str) -> Duration {
        let state = self.host_state(host);
        let mut pacing = state.pacing.lock().await;
        let scaled = pacing.current_delay.as_millis() as f64 * self.config.backoff_factor;
        pacing.current_delay = Duration::from_millis(scaled as u64).min(self.config.max_delay);
        pacing.consecutive_successes = 0;
        // Push the next slot out under the new delay immediately.
        pacing.next_ready = Instant::now() + pacing.current_delay;
        debug!(
            "rate limiter backoff for {host}: delay now {:?}",
            pacing.current_delay
        );
        pacing.current_delay
    }

    /// Fold in a success. Returns `Some(new_delay)` when a recovery
    /// halving occurred.
    pub async fn record_success(&self, host: &str) -> Option<Duration> {
        let state = self.host_state(host);
        let mut pacing = state.pacing.lock().await;
        pacing.consecutive_successes += 1;
        if pacing.consecutive_successes < self.config.recovery_successes
            || pacing.current_delay <= pacing.floor_delay
        {
            return None;
        }
        pacing.consecutive_successes = 0;
        pacing.current_delay = (pacing.current_delay / 2).max(pacing.floor_delay);
        debug!(
            "rate limiter recovered for {host}: delay now {:?}",
            pacing.current_delay
        );
        Some(pacing.current_delay)
    }

    /// Apply a robots `Crawl-delay` directive as the host's floor.
    pub async fn set_crawl_delay(&self, host: &str, crawl_delay: Duration) {
        let state = self.host_state(host);
        let mut pacing = state.pacing.lock().await;
        pacing.floor_delay = crawl_delay.max(self.config.min_delay);
        if pacing.current_delay < pacing.floor_delay {
            pacing.current_delay = pacing.floor_delay;
        }
    }

    /// Current inter-request delay for a host (telemetry and tests).
    pub async fn current_delay(&self, host: &str) -> Duration {
        let state = self.host_state(host);
        let pacing = state.pacing.lock().await;
        pacing.current_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RateLimiterConfig {
        RateLimiterConfig {
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(1000),
            backoff_factor: 2.0,
            recovery_successes: 2,
            per_host_concurrency: 1,
        }
    }

    #[tokio::test]
    async fn test_backoff_doubles_and_caps() {
        let scheduler = PolitenessScheduler::new(test_config());
        assert_eq!(
            scheduler.current_delay("example.com").await,
            Duration::from_millis(10)
        );

        scheduler.record_rate_limited("example.com").await;
        assert_eq!(
            scheduler.current_delay("example.com").await,
            Duration::from_millis(20)
        );

        for _ in 0..20 {
            scheduler.record_rate_limited("example.com").await;
        }
        assert_eq!(
            scheduler.current_delay("example.com").await,
            Duration::from_millis(1000)
        );
    }

    #[tokio::test]
    async fn test_success_streak_halves_back_to_floor() {
        let scheduler = PolitenessScheduler::new(test_config());
        for _ in 0..3 {
            scheduler.record_rate_limited("example.com").await;
        }
        assert_eq!(
            scheduler.current_delay("example.com").await,
            Duration::from_millis(80)
        );

        // Two successes per halving with recovery_successes = 2.
        assert!(scheduler.record_success("example.com").await.is_none());
        assert_eq!(
            scheduler.record_success("example.com").await,
            Some(Duration::from_millis(40))
        );

        for _ in 0..10 {
            scheduler.record_success("example.com").await;
        }
        assert_eq!(
            scheduler.current_delay("example.com").await,
            Duration::from_millis(10)
        );
    }

    #[tokio::test]
    async fn test_crawl_delay_raises_floor() {
        let scheduler = PolitenessScheduler::new(test_config());
        scheduler
            .set_crawl_delay("example.com", Duration::from_millis(50))
            .await;
        assert_eq!(
            scheduler.current_delay("example.com").await,
            Duration::from_millis(50)
        );

        // Recovery can no longer drop below the robots floor.
        scheduler.record_rate_limited("example.com").await;
        for _ in 0..10 {
            scheduler.record_success("example.com").await;
        }
        assert_eq!(
            scheduler.current_delay("example.com").await,
            Duration::from_millis(50)
        );
    }

    #[tokio::test]
    async fn test_acquire_spaces_requests() {
        let scheduler = PolitenessScheduler::new(RateLimiterConfig {
            min_delay: Duration::from_millis(30),
            ..test_config()
        });

        let start = Instant::now();
        drop(scheduler.acquire("example.com").await);
        drop(scheduler.acquire("example.com").await);
        drop(scheduler.acquire("example.com").await);
        // Three acquisitions: the second and third each wait ~30ms.
        assert!(start.elapsed() >= Duration::from_millis(55));
    }

    #[tokio::test]
    async fn test_hosts_are_independent() {
        let scheduler = PolitenessScheduler::new(test_config());
        scheduler.record_rate_limited("slow.example").await;
        assert_eq!(
            scheduler.current_delay("fast.example").await,
            Duration::from_millis(10)
        );
    }
}
