//! Shared fixtures for integration tests.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use newsatlas::browser_pool::{HeadlessPool, HeadlessPoolConfig};
use newsatlas::config::CrawlConfig;
use newsatlas::domain_mode::{DomainModeConfig, DomainModeManager};
use newsatlas::events::EventBus;
use newsatlas::fetch::{build_client, FetchPipeline};
use newsatlas::rate_limiter::{PolitenessScheduler, RateLimiterConfig};
use newsatlas::resilience::{BreakerConfig, CircuitBreaker, Heartbeat, ShutdownSignal};
use newsatlas::robots::RobotsCache;
use newsatlas::storage::Storage;

/// Everything a pipeline test needs, with fast timings.
pub struct TestRig {
    pub pipeline: Arc<FetchPipeline>,
    pub storage: Storage,
    pub bus: Arc<EventBus>,
    pub breaker: Arc<CircuitBreaker>,
    pub shutdown: ShutdownSignal,
    #[allow(dead_code)]
    pub dir: TempDir,
}

/// Build a pipeline against a temp store with millisecond politeness.
/// `min_body_bytes` is lowered so small fixture bodies validate.
pub async fn build_rig() -> TestRig {
    let dir = TempDir::new().expect("temp dir");
    let config = CrawlConfig {
        db_path: dir.path().join("test.sqlite"),
        politeness_min_delay: Duration::from_millis(5),
        min_body_bytes: 40,
        http_timeout: Duration::from_secs(10),
        breaker_retry_window: Duration::from_millis(200),
        depth_probe_delay: Duration::from_millis(1),
        domain_state_path: dir.path().join("modes.json"),
        ..CrawlConfig::default()
    };

    let storage = Storage::open(&config.db_path).await.expect("open store");
    let bus = EventBus::new("test-task", 1024);
    let client = build_client(&config.user_agent, config.http_timeout).expect("client");
    let shutdown = ShutdownSignal::new();

    let scheduler = Arc::new(PolitenessScheduler::new(RateLimiterConfig {
        min_delay: config.politeness_min_delay,
        max_delay: Duration::from_secs(2),
        backoff_factor: 2.0,
        recovery_successes: 5,
        per_host_concurrency: 1,
    }));
    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
        failure_threshold: 3,
        base_retry_window: config.breaker_retry_window,
        max_retry_window: Duration::from_secs(2),
        jitter: 0.0,
    }));
    let domain_mode = Arc::new(
        DomainModeManager::load(
            DomainModeConfig {
                auto_approve: true,
                state_path: config.domain_state_path.clone(),
                ..DomainModeConfig::default()
            },
            Arc::clone(&bus),
        )
        .expect("domain mode"),
    );
    // The pool launches nothing until acquire; tests never escalate.
    let pool = HeadlessPool::new(
        HeadlessPoolConfig {
            acquire_timeout: Duration::from_millis(100),
            ..HeadlessPoolConfig::default()
        },
        Arc::clone(&bus),
    );
    let robots = Arc::new(RobotsCache::new(client.clone()));
    let heartbeat = Heartbeat::new();

    let pipeline = Arc::new(FetchPipeline::new(
        config,
        client,
        storage.clone(),
        scheduler,
        Arc::clone(&breaker),
        domain_mode,
        pool,
        robots,
        Arc::clone(&bus),
        heartbeat,
        shutdown.clone(),
    ));

    TestRig {
        pipeline,
        storage,
        bus,
        breaker,
        shutdown,
        dir,
    }
}

/// A hub-looking page body: dated article links plus time elements.
#[allow(dead_code)]
pub fn hub_page_body(oldest_date: &str, newest_date: &str, link_seed: u32) -> String {
    let mut links = String::new();
    for i in 0..12 {
        links.push_str(&format!(
            "<li><a href=\"/world/2024/01/story-number-{link_seed}-{i}-with-a-long-headline-slug\">Story {i}</a></li>"
        ));
    }
    format!(
        r#"<html><body><main>
        <time datetime="{newest_date}T12:00:00Z">newest</time>
        <ul>{links}</ul>
        <time datetime="{oldest_date}T12:00:00Z">oldest</time>
        </main></body></html>"#
    )
}
