//! Main crawl configuration.
//!
//! Every tunable the engine consumes lives here, grouped by subsystem,
//! with defaults matching production behavior. Construct via
//! [`CrawlConfigBuilder`](super::builder::CrawlConfigBuilder) or start
//! from `CrawlConfig::default()` and override fields.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration mistakes fail fast at startup.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("invalid start URL: {0}")]
    BadStartUrl(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// SQLite store location.
    pub db_path: PathBuf,
    /// Seed URLs for this run.
    pub start_urls: Vec<String>,
    /// Hosts whose previously fetched pages are replayed from cache as
    /// virtual queue entries (no network).
    pub seed_from_cache: Vec<String>,
    /// Number of fetch worker tasks.
    pub workers: usize,
    /// Stop after this many verified downloads (None = unbounded).
    pub page_limit: Option<usize>,
    /// Emit legacy narration in addition to compact PAGE lines.
    pub verbose: bool,

    // --- fetch pipeline ---
    /// Plain-HTTP request timeout.
    pub http_timeout: Duration,
    /// Minimum body size before the validator calls a page empty.
    pub min_body_bytes: usize,
    /// Cache freshness bound for hub-kind URLs; article-kind URLs are
    /// cache-satisfiable indefinitely.
    pub max_age_hub: Duration,
    /// User-Agent header for plain-HTTP fetches.
    pub user_agent: String,

    // --- politeness ---
    pub politeness_min_delay: Duration,
    pub politeness_max_delay: Duration,
    pub politeness_backoff_factor: f64,
    pub politeness_recovery_successes: u32,
    pub per_host_concurrency: usize,

    // --- circuit breaker ---
    pub breaker_failure_threshold: u32,
    pub breaker_retry_window: Duration,
    pub breaker_max_retry_window: Duration,

    // --- stall detection / shutdown ---
    pub stall_after: Duration,
    pub shutdown_grace: Duration,

    // --- headless pool ---
    pub pool_max_sessions: usize,
    pub pool_max_pages_per_session: u64,
    pub pool_max_session_age: Duration,
    pub pool_health_check_interval: Duration,
    pub pool_acquire_timeout: Duration,

    // --- domain-mode learning ---
    pub domain_auto_learn_window: Duration,
    pub domain_auto_learn_threshold: u32,
    pub domain_auto_approve: bool,
    pub domain_state_path: PathBuf,

    // --- discovery ---
    pub archive_probe_cooldown: Duration,
    /// Probe a host only when its pending queue is below this depth.
    pub archive_probe_queue_threshold: i64,
    pub archive_max_years_back: u32,
    pub pagination_max_speculative_pages: u32,
    pub pagination_entry_ttl: Duration,

    // --- hub depth probing ---
    pub depth_probe_delay: Duration,
    /// Exponential search ceiling.
    pub depth_probe_ceiling: u32,
    /// Days the oldest date may move forward before loopback is inferred.
    pub depth_time_travel_tolerance_days: i64,

    // --- external data ---
    pub gazetteer_path: Option<PathBuf>,
    pub proxy_config_path: Option<PathBuf>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("newsatlas.sqlite"),
            start_urls: Vec::new(),
            seed_from_cache: Vec::new(),
            workers: 4,
            page_limit: None,
            verbose: false,

            http_timeout: Duration::from_secs(30),
            min_body_bytes: 500,
            max_age_hub: Duration::from_secs(600),
            user_agent: format!("newsatlas/{}", env!("CARGO_PKG_VERSION")),

            politeness_min_delay: Duration::from_millis(1000),
            politeness_max_delay: Duration::from_secs(120),
            politeness_backoff_factor: 2.0,
            politeness_recovery_successes: 5,
            per_host_concurrency: 1,

            breaker_failure_threshold: 5,
            breaker_retry_window: Duration::from_secs(60),
            breaker_max_retry_window: Duration::from_secs(15 * 60),

            stall_after: Duration::from_secs(120),
            shutdown_grace: Duration::from_secs(10),

            pool_max_sessions: 3,
            pool_max_pages_per_session: 50,
            pool_max_session_age: Duration::from_secs(600),
            pool_health_check_interval: Duration::from_secs(30),
            pool_acquire_timeout: Duration::from_secs(60),

            domain_auto_learn_window: Duration::from_secs(300),
            domain_auto_learn_threshold: 3,
            domain_auto_approve: false,
            domain_state_path: PathBuf::from("newsatlas-domain-modes.json"),

            archive_probe_cooldown: Duration::from_secs(3600),
            archive_probe_queue_threshold: 10,
            archive_max_years_back: 2,
            pagination_max_speculative_pages: 3,
            pagination_entry_ttl: Duration::from_secs(3600),

            depth_probe_delay: Duration::from_millis(500),
            depth_probe_ceiling: 4096,
            depth_time_travel_tolerance_days: 7,

            gazetteer_path: None,
            proxy_config_path: None,
        }
    }
}

impl CrawlConfig {
    /// Fail-fast sanity checks, run once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.politeness_backoff_factor < 1.0 {
            return Err(ConfigError::Invalid(
                "politeness_backoff_factor must be >= 1.0".into(),
            ));
        }
        if self.breaker_failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "breaker_failure_threshold must be at least 1".into(),
            ));
        }
        if self.pool_max_sessions == 0 {
            return Err(ConfigError::Invalid(
                "pool_max_sessions must be at least 1".into(),
            ));
        }
        for url in &self.start_urls {
            if url::Url::parse(url).is_err() {
                return Err(ConfigError::BadStartUrl(url.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CrawlConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_start_url_rejected() {
        let config = CrawlConfig {
            start_urls: vec!["not a url".to_string()],
            ..CrawlConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = CrawlConfig {
            workers: 0,
            ..CrawlConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
