//! Engine assembly: wires storage, telemetry, resilience, politeness,
//! the headless pool and the queue into a runnable crawler.
//!
//! Lifecycle: [`Crawler::init`] builds everything and starts background
//! services (event recorder, stall detector, pool health checks);
//! [`Crawler::run`] executes the crawl; [`Crawler::finish`] flushes and
//! releases resources. Ctrl-C or any caller may trip the shutdown
//! signal at any point.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use crate::browser_pool::{HeadlessPool, HeadlessPoolConfig};
use crate::config::CrawlConfig;
use crate::discovery::{ArchiveProbe, ArchiveProbeConfig, PaginationConfig, PaginationPredictor};
use crate::domain_mode::{DomainModeConfig, DomainModeManager};
use crate::events::{EventBus, EventRecorder};
use crate::fetch::{build_client, FetchPipeline};
use crate::gazetteer::{Gazetteer, PlaceKind};
use crate::hub_depth::HubDepthProber;
use crate::queue::{CrawlOrchestrator, CrawlSummary, QueueManager};
use crate::rate_limiter::{PolitenessScheduler, RateLimiterConfig};
use crate::resilience::{
    spawn_stall_detector, BreakerConfig, CircuitBreaker, Heartbeat, ShutdownSignal,
};
use crate::robots::RobotsCache;
use crate::storage::Storage;

pub struct Crawler {
    config: CrawlConfig,
    storage: Storage,
    bus: Arc<EventBus>,
    recorder: Option<EventRecorder>,
    breaker: Arc<CircuitBreaker>,
    domain_mode: Arc<DomainModeManager>,
    pool: Arc<HeadlessPool>,
    pipeline: Arc<FetchPipeline>,
    queue: Arc<QueueManager>,
    pagination: Arc<PaginationPredictor>,
    archive_probe: Arc<ArchiveProbe>,
    gazetteer: Option<Gazetteer>,
    heartbeat: Heartbeat,
    shutdown: ShutdownSignal,
    stall_task: tokio::task::JoinHandle<()>,
}

impl Crawler {
    /// Build the full engine from configuration.
    pub async fn init(config: CrawlConfig) -> Result<Self> {
        config.validate()?;

        let task_id = uuid::Uuid::new_v4().to_string();
        let storage = Storage::open(&config.db_path).await?;
        let recovered = storage.recover_stale_leases().await?;
        if recovered > 0 {
            info!("recovered {recovered} stale leases from a previous run");
        }

        let bus = EventBus::new(task_id, 4096);
        let recorder = EventRecorder::spawn(&bus, storage.clone());

        let client = build_client(&config.user_agent, config.http_timeout)?;
        let shutdown = ShutdownSignal::new();
        let heartbeat = Heartbeat::new();

        let scheduler = Arc::new(PolitenessScheduler::new(RateLimiterConfig {
            min_delay: config.politeness_min_delay,
            max_delay: config.politeness_max_delay,
            backoff_factor: config.politeness_backoff_factor,
            recovery_successes: config.politeness_recovery_successes,
            per_host_concurrency: config.per_host_concurrency,
        }));

        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
            failure_threshold: config.breaker_failure_threshold,
            base_retry_window: config.breaker_retry_window,
            max_retry_window: config.breaker_max_retry_window,
            jitter: 0.2,
        }));

        let domain_mode = Arc::new(
            DomainModeManager::load(
                DomainModeConfig {
                    auto_learn_window: config.domain_auto_learn_window,
                    auto_learn_threshold: config.domain_auto_learn_threshold,
                    auto_approve: config.domain_auto_approve,
                    state_path: config.domain_state_path.clone(),
                },
                Arc::clone(&bus),
            )
            .context("Failed to load domain-mode state")?,
        );

        let pool = HeadlessPool::new(
            HeadlessPoolConfig {
                max_sessions: config.pool_max_sessions,
                max_pages_per_session: config.pool_max_pages_per_session,
                max_session_age: config.pool_max_session_age,
                health_check_interval: config.pool_health_check_interval,
                acquire_timeout: config.pool_acquire_timeout,
                page_timeout: config.http_timeout,
            },
            Arc::clone(&bus),
        );
        pool.start().await;

        let robots = Arc::new(RobotsCache::new(client.clone()));

        let pipeline = Arc::new(FetchPipeline::new(
            config.clone(),
            client.clone(),
            storage.clone(),
            Arc::clone(&scheduler),
            Arc::clone(&breaker),
            Arc::clone(&domain_mode),
            Arc::clone(&pool),
            robots,
            Arc::clone(&bus),
            heartbeat.clone(),
            shutdown.clone(),
        ));

        let queue = Arc::new(QueueManager::new(storage.clone()));
        let pagination = Arc::new(PaginationPredictor::new(PaginationConfig {
            max_speculative_pages: config.pagination_max_speculative_pages,
            entry_ttl: config.pagination_entry_ttl,
        }));
        let archive_probe = Arc::new(ArchiveProbe::new(
            ArchiveProbeConfig {
                cooldown: config.archive_probe_cooldown,
                queue_threshold: config.archive_probe_queue_threshold,
                max_years_back: config.archive_max_years_back,
            },
            client,
        ));

        let gazetteer = match &config.gazetteer_path {
            Some(path) => Some(Gazetteer::load(path)?),
            None => None,
        };

        let stall_task = spawn_stall_detector(
            heartbeat.clone(),
            config.stall_after,
            Arc::clone(&breaker),
            storage.clone(),
            Arc::clone(&bus),
            shutdown.clone(),
        );

        Ok(Self {
            config,
            storage,
            bus,
            recorder: Some(recorder),
            breaker,
            domain_mode,
            pool,
            pipeline,
            queue,
            pagination,
            archive_probe,
            gazetteer,
            heartbeat,
            shutdown,
            stall_task,
        })
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    #[must_use]
    pub fn domain_mode(&self) -> &Arc<DomainModeManager> {
        &self.domain_mode
    }

    #[must_use]
    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Run the main crawl loop, with the periodic discovery/learning
    /// maintenance task alongside it.
    pub async fn run(&self) -> Result<CrawlSummary> {
        let orchestrator = CrawlOrchestrator::new(
            self.config.clone(),
            Arc::clone(&self.queue),
            Arc::clone(&self.breaker),
            Arc::clone(&self.pipeline),
            Arc::clone(&self.pagination),
            Arc::clone(&self.bus),
            self.shutdown.clone(),
        );

        let maintenance = self.spawn_maintenance();
        let summary = orchestrator.run(&self.heartbeat).await;
        maintenance.abort();
        summary
    }

    /// Hosts this run works, derived from seeds and cache-seed lists.
    fn active_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .config
            .start_urls
            .iter()
            .filter_map(|u| crate::util::urls::extract_host(u).ok())
            .chain(self.config.seed_from_cache.iter().cloned())
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }

    /// Background loop: archive probes when a host's queue runs dry,
    /// plus periodic pattern learning from verified classifications.
    fn spawn_maintenance(&self) -> tokio::task::JoinHandle<()> {
        let hosts = self.active_hosts();
        let storage = self.storage.clone();
        let queue = Arc::clone(&self.queue);
        let archive_probe = Arc::clone(&self.archive_probe);
        let bus = Arc::clone(&self.bus);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let learner = crate::classify::PatternLearner::new(storage.clone());
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(60));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Skip the immediate first tick so the crawl warms up first.
            tick.tick().await;

            loop {
                if shutdown.guard(tick.tick()).await.is_none() {
                    return;
                }
                for host in &hosts {
                    let depth = storage.queue_depth_for_host(host).await.unwrap_or(0);
                    if archive_probe.is_due(host, depth) {
                        let found = archive_probe.probe_host(host, &[], &bus).await;
                        for url in found {
                            let page_number =
                                crate::discovery::pagination::detect(&url).map(|(_, n, _)| n);
                            let _ = queue
                                .admit(
                                    &url,
                                    crate::queue::AdmitHints {
                                        page_number,
                                        ..Default::default()
                                    },
                                )
                                .await;
                        }
                    }
                    if let Err(e) = learner.learn_host(host, &bus).await {
                        log::debug!("pattern learning failed for {host}: {e:#}");
                    }
                }
            }
        })
    }

    /// Probe depth on verified hubs (optionally one host), newest-first.
    pub async fn probe_hub_depths(&self, host: Option<&str>, limit: i64) -> Result<usize> {
        let hubs = self.storage.verified_hubs(host, limit).await?;
        let prober = HubDepthProber::new(&self.pipeline, self.shutdown.clone());
        let mut probed = 0;
        for hub in &hubs {
            if self.shutdown.is_cancelled() {
                break;
            }
            if let Err(e) = prober.probe_mapping(hub).await {
                log::warn!("depth probe failed for {}: {e:#}", hub.url);
            } else {
                probed += 1;
            }
        }
        Ok(probed)
    }

    /// Probe depth on candidate mappings, verifying presence as it goes.
    pub async fn probe_candidates(&self, limit: i64) -> Result<usize> {
        let candidates = self.storage.candidate_mappings(limit).await?;
        let prober = HubDepthProber::new(&self.pipeline, self.shutdown.clone());
        let mut probed = 0;
        for mapping in &candidates {
            if self.shutdown.is_cancelled() {
                break;
            }
            self.storage.mark_mapping_pending(mapping.id).await?;
            match prober.probe_mapping(mapping).await {
                Ok(()) => probed += 1,
                Err(e) => log::warn!("candidate probe failed for {}: {e:#}", mapping.url),
            }
        }
        Ok(probed)
    }

    /// Generate candidate hub mappings for a domain from learned
    /// patterns and the gazetteer.
    pub async fn guess_place_hubs(&self, domain: &str, kinds: &[PlaceKind]) -> Result<u64> {
        let gazetteer = self
            .gazetteer
            .as_ref()
            .context("no gazetteer configured (set gazetteer_path)")?;
        let seeder = crate::discovery::HubSeeder::new(self.storage.clone());
        seeder.seed_host(domain, gazetteer, kinds, &self.bus).await
    }

    /// One archive-probe round for a host, feeding results into the queue.
    pub async fn probe_archives(&self, host: &str, sections: &[String]) -> Result<usize> {
        let depth = self.storage.queue_depth_for_host(host).await?;
        if !self.archive_probe.is_due(host, depth) {
            return Ok(0);
        }
        let found = self.archive_probe.probe_host(host, sections, &self.bus).await;
        let mut admitted = 0;
        for url in found {
            let page_number = crate::discovery::pagination::detect(&url).map(|(_, n, _)| n);
            if matches!(
                self.queue
                    .admit(&url, crate::queue::AdmitHints {
                        page_number,
                        ..Default::default()
                    })
                    .await?,
                crate::queue::AdmitDecision::Enqueued { .. }
            ) {
                admitted += 1;
            }
        }
        Ok(admitted)
    }

    /// Flush telemetry, persist state, close sessions. Consumes the
    /// crawler; call once at the end of the process.
    pub async fn finish(mut self) -> Result<()> {
        self.shutdown.cancel();
        self.stall_task.abort();
        self.pool.shutdown().await;
        self.domain_mode.persist()?;
        if let Some(recorder) = self.recorder.take() {
            recorder.finish().await;
        }
        self.storage.close().await;
        Ok(())
    }
}
