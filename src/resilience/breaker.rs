//! Circuit breaker for per-host failure detection.
//!
//! Tracks host health across three states:
//! - Closed: normal operation, requests proceed
//! - Open: too many consecutive failures, requests are blocked
//! - `HalfOpen`: probing after the retry window elapsed
//!
//! A single success in `HalfOpen` closes the circuit; any failure
//! re-opens it with a doubled retry window (jittered, capped), so a
//! host that keeps failing is probed progressively less often.

use dashmap::DashMap;
use log::{debug, info, warn};
use rand::Rng;
use std::time::{Duration, Instant};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests proceed
    Closed,
    /// Probing after the retry window - one request allowed through
    HalfOpen,
    /// Failing - requests blocked until `next_retry_at`
    Open,
}

/// Health tracking for a single host.
#[derive(Debug, Clone)]
pub struct HostHealth {
    /// Consecutive failures without a success.
    pub consecutive_failures: u32,
    pub total_attempts: u32,
    pub total_successes: u32,
    pub last_success: Option<Instant>,
    /// When the circuit last opened.
    pub opened_at: Option<Instant>,
    /// Earliest time an Open circuit transitions to `HalfOpen`.
    pub next_retry_at: Option<Instant>,
    /// Current (possibly doubled) retry window.
    pub retry_window: Duration,
    /// Most recent failure description, for stall diagnostics.
    pub last_error: Option<String>,
    pub state: CircuitState,
}

impl HostHealth {
    fn new(base_window: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            total_attempts: 0,
            total_successes: 0,
            last_success: None,
            opened_at: None,
            next_retry_at: None,
            retry_window: base_window,
            last_error: None,
            state: CircuitState::Closed,
        }
    }
}

/// Breaker configuration.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Initial retry window after opening.
    pub base_retry_window: Duration,
    /// Cap on the doubled retry window.
    pub max_retry_window: Duration,
    /// Jitter fraction applied to each window (±).
    pub jitter: f64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            base_retry_window: Duration::from_secs(60),
            max_retry_window: Duration::from_secs(15 * 60),
            jitter: 0.2,
        }
    }
}

/// Per-host circuit breaker.
pub struct CircuitBreaker {
    hosts: DashMap<String, HostHealth>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            hosts: DashMap::new(),
            config,
        }
    }

    /// Whether a request to `host` should proceed.
    ///
    /// Also performs the Open → `HalfOpen` transition once
    /// `next_retry_at` has passed.
    pub fn should_attempt(&self, host: &str) -> bool {
        let mut health = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| HostHealth::new(self.config.base_retry_window));

        match health.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if let Some(retry_at) = health.next_retry_at {
                    if Instant::now() >= retry_at {
                        health.state = CircuitState::HalfOpen;
                        info!("circuit breaker HALF-OPEN for host: {host}");
                        return true;
                    }
                }
                false
            }
        }
    }

    /// Record a successful request. A `HalfOpen` circuit closes and its
    /// retry window resets to the base.
    ///
    /// Returns true when this success closed the circuit.
    pub fn record_success(&self, host: &str) -> bool {
        let mut health = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| HostHealth::new(self.config.base_retry_window));

        health.consecutive_failures = 0;
        health.total_successes += 1;
        health.total_attempts += 1;
        health.last_success = Some(Instant::now());

        if health.state == CircuitState::HalfOpen {
            health.state = CircuitState::Closed;
            health.retry_window = self.config.base_retry_window;
            health.next_retry_at = None;
            info!("circuit breaker CLOSED for host: {host}");
            true
        } else {
            false
        }
    }

    /// Record a failed request. Returns the new state so callers can
    /// emit a `breaker.open` event on the Closed → Open edge.
    pub fn record_failure(&self, host: &str, error: &str) -> CircuitState {
        let mut health = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| HostHealth::new(self.config.base_retry_window));

        health.consecutive_failures += 1;
        health.total_attempts += 1;
        health.last_error = Some(error.to_string());

        match health.state {
            CircuitState::HalfOpen => {
                // Probe failed: reopen with a doubled window.
                let doubled = health.retry_window * 2;
                health.retry_window = doubled.min(self.config.max_retry_window);
                self.open(&mut health, host, error);
            }
            CircuitState::Closed if health.consecutive_failures >= self.config.failure_threshold => {
                self.open(&mut health, host, error);
            }
            CircuitState::Closed => {
                debug!(
                    "circuit breaker failure for {host} ({}/{}): {error}",
                    health.consecutive_failures, self.config.failure_threshold
                );
            }
            CircuitState::Open => {}
        }

        health.state
    }

    fn open(&self, health: &mut HostHealth, host: &str, error: &str) {
        let window = jittered(health.retry_window, self.config.jitter);
        health.state = CircuitState::Open;
        health.opened_at = Some(Instant::now());
        health.next_retry_at = Some(Instant::now() + window);
        warn!(
            "circuit breaker OPEN for host {host} after {} consecutive failures (retry in {window:?}). Last error: {error}",
            health.consecutive_failures
        );
    }

    #[must_use]
    pub fn health(&self, host: &str) -> Option<HostHealth> {
        self.hosts.get(host).map(|r| r.value().clone())
    }

    /// Hosts currently in Open state.
    #[must_use]
    pub fn open_hosts(&self) -> Vec<String> {
        self.hosts
            .iter()
            .filter(|entry| entry.value().state == CircuitState::Open)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// (host, last error) pairs for diagnostics.
    #[must_use]
    pub fn last_errors(&self) -> Vec<(String, String)> {
        self.hosts
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .last_error
                    .clone()
                    .map(|e| (entry.key().clone(), e))
            })
            .collect()
    }
}

/// Apply ± jitter to a duration.
fn jittered(base: Duration, jitter: f64) -> Duration {
    let factor = 1.0 + rand::rng().random_range(-jitter..=jitter);
    Duration::from_millis((base.as_millis() as f64 * factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, window_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            base_retry_window: Duration::from_millis(window_ms),
            max_retry_window: Duration::from_millis(window_ms * 8),
            jitter: 0.0,
        })
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker(3, 60_000);

        cb.record_failure("example.com", "reset");
        cb.record_failure("example.com", "reset");
        assert!(cb.should_attempt("example.com"));

        cb.record_failure("example.com", "reset");
        let health = cb.health("example.com").unwrap();
        assert_eq!(health.state, CircuitState::Open);
        assert!(!cb.should_attempt("example.com"));
        assert!(health.next_retry_at.is_some());
    }

    #[test]
    fn test_half_open_after_window_then_closes_on_success() {
        let cb = breaker(2, 50);
        cb.record_failure("example.com", "reset");
        cb.record_failure("example.com", "reset");
        assert!(!cb.should_attempt("example.com"));

        std::thread::sleep(Duration::from_millis(70));
        assert!(cb.should_attempt("example.com"));
        assert_eq!(
            cb.health("example.com").unwrap().state,
            CircuitState::HalfOpen
        );

        // One success closes the circuit and resets the window.
        assert!(cb.record_success("example.com"));
        let health = cb.health("example.com").unwrap();
        assert_eq!(health.state, CircuitState::Closed);
        assert_eq!(health.retry_window, Duration::from_millis(50));
    }

    #[test]
    fn test_half_open_failure_doubles_window() {
        let cb = breaker(2, 50);
        cb.record_failure("example.com", "reset");
        cb.record_failure("example.com", "reset");

        std::thread::sleep(Duration::from_millis(70));
        assert!(cb.should_attempt("example.com"));

        cb.record_failure("example.com", "reset again");
        let health = cb.health("example.com").unwrap();
        assert_eq!(health.state, CircuitState::Open);
        assert_eq!(health.retry_window, Duration::from_millis(100));
    }

    #[test]
    fn test_window_doubling_is_capped() {
        let cb = breaker(1, 50);
        for _ in 0..10 {
            cb.record_failure("example.com", "reset");
            std::thread::sleep(Duration::from_millis(1));
            // Force half-open by faking elapsed time is impractical here;
            // drive the doubling through half-open failures directly.
            if let Some(mut h) = cb.hosts.get_mut("example.com") {
                h.state = CircuitState::HalfOpen;
            }
        }
        let health = cb.health("example.com").unwrap();
        assert!(health.retry_window <= Duration::from_millis(400));
    }

    #[test]
    fn test_open_hosts_listing() {
        let cb = breaker(1, 60_000);
        cb.record_failure("bad.example", "reset");
        cb.record_success("good.example");
        assert_eq!(cb.open_hosts(), vec!["bad.example".to_string()]);
    }
}
