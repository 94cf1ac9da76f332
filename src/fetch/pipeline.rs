//! The fetch pipeline: breaker gate → cache tie-break → robots →
//! politeness lease → HTTP (or headless) fetch → validation →
//! escalation → atomic persistence → telemetry.
//!
//! Evidence discipline: every network attempt leaves exactly one
//! `http_responses` row. Accepted bodies persist atomically with their
//! row; rejected bodies are discarded and their row carries
//! `bytes_downloaded = 0` plus the rejection reason, so a rejected
//! attempt can never masquerade as a verified download. Cache hits
//! touch no network and create no row.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};

use crate::browser_pool::HeadlessPool;
use crate::config::CrawlConfig;
use crate::domain_mode::{DomainModeManager, DomainTier};
use crate::events::{EventBus, FetchSource, TaskEvent};
use crate::rate_limiter::PolitenessScheduler;
use crate::resilience::{CircuitBreaker, Heartbeat, ShutdownSignal};
use crate::robots::RobotsCache;
use crate::storage::{ResponseRecord, Storage};
use crate::validator::{self, FailureClass};

use super::http::{self, HttpFetchResult};
use super::types::{FailureKind, FetchOutcome, UrlKind};

/// Everything a fetch needs, wired once per run.
pub struct FetchPipeline {
    pub(crate) config: CrawlConfig,
    client: reqwest::Client,
    storage: Storage,
    scheduler: Arc<PolitenessScheduler>,
    breaker: Arc<CircuitBreaker>,
    domain_mode: Arc<DomainModeManager>,
    pool: Arc<HeadlessPool>,
    robots: Arc<RobotsCache>,
    bus: Arc<EventBus>,
    heartbeat: Heartbeat,
    shutdown: ShutdownSignal,
}

#[allow(clippy::too_many_arguments)]
impl FetchPipeline {
    pub fn new(
        config: CrawlConfig,
        client: reqwest::Client,
        storage: Storage,
        scheduler: Arc<PolitenessScheduler>,
        breaker: Arc<CircuitBreaker>,
        domain_mode: Arc<DomainModeManager>,
        pool: Arc<HeadlessPool>,
        robots: Arc<RobotsCache>,
        bus: Arc<EventBus>,
        heartbeat: Heartbeat,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            config,
            client,
            storage,
            scheduler,
            breaker,
            domain_mode,
            pool,
            robots,
            bus,
            heartbeat,
            shutdown,
        }
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Fetch one URL. Never returns a raw error; every path resolves to
    /// a [`FetchOutcome`].
    pub async fn fetch(&self, url: &str, host: &str, kind: UrlKind) -> FetchOutcome {
        if self.shutdown.is_cancelled() {
            return FetchOutcome::Failed {
                kind: FailureKind::Cancelled,
                detail: "crawl cancelled".into(),
                response_id: None,
            };
        }

        // Cache tie-break: a fresh-enough stored copy satisfies the
        // fetch without network, breaker, or politeness involvement.
        if let Some(stored) = self.try_cache(url, kind).await {
            self.emit_page(url, FetchSource::Cache, 200, stored.body.len() as u64, 0);
            return FetchOutcome::CacheHit { stored };
        }

        // Breaker gate.
        if !self.breaker.should_attempt(host) {
            let retry_in_ms = self
                .breaker
                .health(host)
                .and_then(|h| h.next_retry_at)
                .map(|at| {
                    at.saturating_duration_since(std::time::Instant::now())
                        .as_millis() as i64
                });
            self.bus.publish(&TaskEvent::FetchDeferred {
                url: url.to_string(),
                host: host.to_string(),
            });
            debug!("breaker open, deferring {url}");
            return FetchOutcome::Deferred {
                host: host.to_string(),
                retry_in_ms,
            };
        }

        // Robots: a disallowed URL is an intentional skip, not an attempt.
        let rules = self.robots.rules_for(host).await;
        if let Some(delay) = rules.crawl_delay {
            self.scheduler.set_crawl_delay(host, delay).await;
        }
        let path = url::Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| "/".to_string());
        if !rules.is_allowed(&path) {
            self.emit_failure(url, FailureKind::HardContent, "robots disallow");
            return FetchOutcome::RobotsDenied;
        }

        // Politeness token; cancellable while waiting.
        let Some(lease) = self.shutdown.guard(self.scheduler.acquire(host)).await else {
            return FetchOutcome::Failed {
                kind: FailureKind::Cancelled,
                detail: "cancelled waiting for politeness token".into(),
                response_id: None,
            };
        };

        let outcome = if self.domain_mode.should_use_headless(host) {
            self.fetch_headless(url, host, None).await
        } else {
            self.fetch_http_first(url, host).await
        };
        drop(lease);

        if outcome.is_success() {
            self.heartbeat.beat();
            if self.breaker.record_success(host) {
                self.bus.publish(&TaskEvent::BreakerClosed {
                    host: host.to_string(),
                });
            }
            if let Some(new_delay) = self.scheduler.record_success(host).await {
                self.bus.publish(&TaskEvent::RateRecovered {
                    host: host.to_string(),
                    delay_ms: new_delay.as_millis() as u64,
                });
            }
        }

        outcome
    }

    /// Cache lookup honoring the hub/article freshness split.
    async fn try_cache(&self, url: &str, kind: UrlKind) -> Option<crate::storage::StoredBody> {
        let url_id = self.storage.url_id(url).await.ok()??;
        let stored = self.storage.cached_body(url_id).await.ok()??;

        let age_ms = chrono::Utc::now().timestamp_millis() - stored.fetched_at;
        let fresh = match kind {
            UrlKind::Article => true,
            UrlKind::Hub | UrlKind::Unknown => {
                age_ms < self.config.max_age_hub.as_millis() as i64
            }
        };
        fresh.then_some(stored)
    }

    /// HTTP-first path with single escalation to headless.
    async fn fetch_http_first(&self, url: &str, host: &str) -> FetchOutcome {
        let started = Instant::now();
        let result = match self.shutdown.guard(http::fetch_url(&self.client, url)).await {
            None => {
                return FetchOutcome::Failed {
                    kind: FailureKind::Cancelled,
                    detail: "cancelled during fetch".into(),
                    response_id: None,
                }
            }
            Some(result) => result,
        };

        match result {
            Err(transport_error) => {
                let kind = FailureKind::classify_transport(&transport_error);
                let detail = format!("{transport_error}");
                let response_id = self
                    .persist_failed_attempt(url, 0, None, None, started, "network", &detail)
                    .await;

                if kind.counts_toward_breaker() {
                    self.record_breaker_failure(host, &detail);
                }

                if kind == FailureKind::ConnectionReset {
                    let promoted = self.domain_mode.record_reset_failure(host);
                    if promoted == Some(DomainTier::Learned) {
                        // Host just crossed into headless mode: finish
                        // this fetch through the pool instead of failing.
                        return self.fetch_headless(url, host, None).await;
                    }
                }

                self.emit_failure(url, kind, &detail);
                FetchOutcome::Failed {
                    kind,
                    detail,
                    response_id: Some(response_id),
                }
            }
            Ok(http_result) => self.handle_http_response(url, host, http_result, started).await,
        }
    }

    async fn handle_http_response(
        &self,
        url: &str,
        host: &str,
        result: HttpFetchResult,
        started: Instant,
    ) -> FetchOutcome {
        let status = result.http_status;

        // Rate-limit statuses feed the politeness scheduler, not the breaker.
        if status == 429 || status == 503 {
            let new_delay = self.scheduler.record_rate_limited(host).await;
            self.bus.publish(&TaskEvent::RateBackoff {
                host: host.to_string(),
                delay_ms: new_delay.as_millis() as u64,
                http_status: status,
            });
            let detail = format!("rate limited (HTTP {status})");
            let response_id = self
                .persist_failed_attempt(
                    url,
                    status,
                    result.content_type.as_deref(),
                    Some(&result),
                    started,
                    "network",
                    &detail,
                )
                .await;
            self.emit_failure(url, FailureKind::Http(status), &detail);
            return FetchOutcome::Failed {
                kind: FailureKind::Http(status),
                detail,
                response_id: Some(response_id),
            };
        }

        // 401/403 from a host not already known-blocked may be TLS/bot
        // fingerprinting: probe once through a real browser.
        if (status == 401 || status == 403) && !self.domain_mode.should_use_headless(host) {
            let detail = format!("HTTP {status}, probing via headless");
            let response_id = self
                .persist_failed_attempt(
                    url,
                    status,
                    result.content_type.as_deref(),
                    Some(&result),
                    started,
                    "network",
                    &detail,
                )
                .await;
            debug!("{detail}: {url}");
            return self.fetch_headless(url, host, Some(response_id)).await;
        }

        let verdict = validator::validate(
            url,
            status,
            &result.body,
            result.content_type.as_deref(),
            false,
            self.config.min_body_bytes,
        );

        if verdict.accepted {
            return self
                .persist_success(url, status, result, FetchSource::Network)
                .await;
        }

        let reason = verdict.reason.unwrap_or_else(|| "rejected".into());
        match verdict.failure_class {
            FailureClass::Soft => {
                // One escalation to the rendered path.
                let detail = format!("escalating to headless: {reason}");
                let response_id = self
                    .persist_failed_attempt(
                        url,
                        status,
                        result.content_type.as_deref(),
                        Some(&result),
                        started,
                        "network",
                        &detail,
                    )
                    .await;
                debug!("{detail}: {url}");
                self.fetch_headless(url, host, Some(response_id)).await
            }
            FailureClass::Hard | FailureClass::None => {
                let response_id = self
                    .persist_failed_attempt(
                        url,
                        status,
                        result.content_type.as_deref(),
                        Some(&result),
                        started,
                        "network",
                        &reason,
                    )
                    .await;
                let kind = if status >= 400 {
                    FailureKind::Http(status)
                } else {
                    FailureKind::HardContent
                };
                // Dead links (404) are the URL's problem, not the host's.
                if kind.counts_toward_breaker() {
                    self.record_breaker_failure(host, &reason);
                }
                self.emit_failure(url, kind, &reason);
                FetchOutcome::Failed {
                    kind,
                    detail: reason,
                    response_id: Some(response_id),
                }
            }
        }
    }

    /// Rendered fetch through the pool. `prior_attempt` is the evidence
    /// row of the HTTP attempt this escalation follows, if any.
    async fn fetch_headless(
        &self,
        url: &str,
        host: &str,
        prior_attempt: Option<i64>,
    ) -> FetchOutcome {
        let started = Instant::now();

        let mut guard = match self.shutdown.guard(self.pool.acquire()).await {
            None => {
                return FetchOutcome::Failed {
                    kind: FailureKind::Cancelled,
                    detail: "cancelled waiting for headless session".into(),
                    response_id: prior_attempt,
                }
            }
            Some(Ok(guard)) => guard,
            Some(Err(e)) => {
                let detail = format!("headless pool: {e:#}");
                self.emit_failure(url, FailureKind::Headless, &detail);
                return FetchOutcome::Failed {
                    kind: FailureKind::Headless,
                    detail,
                    response_id: prior_attempt,
                };
            }
        };

        match guard.render(url).await {
            Err(e) => {
                let detail = format!("render failed: {e:#}");
                let response_id = self
                    .persist_failed_attempt(url, 0, None, None, started, "headless", &detail)
                    .await;
                self.record_breaker_failure(host, &detail);
                self.emit_failure(url, FailureKind::Headless, &detail);
                FetchOutcome::Failed {
                    kind: FailureKind::Headless,
                    detail,
                    response_id: Some(response_id),
                }
            }
            Ok(rendered) => {
                let body = rendered.html.into_bytes();
                let verdict = validator::validate(
                    url,
                    200,
                    &body,
                    Some("text/html"),
                    false,
                    self.config.min_body_bytes,
                );

                if verdict.accepted {
                    let download_ms = started.elapsed().as_millis() as i64;
                    let result = HttpFetchResult {
                        http_status: 200,
                        body,
                        content_type: Some("text/html".to_string()),
                        final_url: rendered.final_url,
                        ttfb_ms: download_ms,
                        download_ms,
                    };
                    return self
                        .persist_success(url, 200, result, FetchSource::Headless)
                        .await;
                }

                // Rendered content still rejected: no further escalation.
                let reason = verdict.reason.unwrap_or_else(|| "rejected".into());
                let response_id = self
                    .persist_failed_attempt(url, 200, Some("text/html"), None, started, "headless", &reason)
                    .await;
                let kind = match verdict.failure_class {
                    FailureClass::Hard => {
                        self.record_breaker_failure(host, &reason);
                        FailureKind::HardContent
                    }
                    _ => FailureKind::SoftContent,
                };
                self.emit_failure(url, kind, &reason);
                FetchOutcome::Failed {
                    kind,
                    detail: reason,
                    response_id: Some(response_id),
                }
            }
        }
    }

    async fn persist_success(
        &self,
        url: &str,
        status: u16,
        result: HttpFetchResult,
        source: FetchSource,
    ) -> FetchOutcome {
        let host = crate::util::urls::extract_host(url).unwrap_or_default();
        let url_id = match self.storage.intern_url(url, &host).await {
            Ok(id) => id,
            Err(e) => {
                // Persistence failure is fatal to the item, not the worker.
                let detail = format!("store failure: {e:#}");
                warn!("{detail} for {url}");
                self.emit_failure(url, FailureKind::Network, &detail);
                return FetchOutcome::Failed {
                    kind: FailureKind::Network,
                    detail,
                    response_id: None,
                };
            }
        };

        let record = ResponseRecord {
            url_id,
            http_status: status,
            bytes_downloaded: result.body.len() as u64,
            content_type: result.content_type.clone(),
            ttfb_ms: Some(result.ttfb_ms),
            download_ms: Some(result.download_ms),
            fetch_source: source.as_str().to_string(),
            diagnostic: None,
        };

        match self
            .storage
            .record_response_with_body(&record, &result.body)
            .await
        {
            Ok((response_id, content_id)) => {
                self.emit_page(url, source, status, result.body.len() as u64, result.download_ms);
                FetchOutcome::Fetched {
                    response_id,
                    content_id,
                    http_status: status,
                    body: result.body,
                    source,
                    download_ms: result.download_ms,
                    final_url: result.final_url,
                }
            }
            Err(e) => {
                let detail = format!("store failure: {e:#}");
                warn!("{detail} for {url}");
                self.emit_failure(url, FailureKind::Network, &detail);
                FetchOutcome::Failed {
                    kind: FailureKind::Network,
                    detail,
                    response_id: None,
                }
            }
        }
    }

    /// Evidence row for a failed or rejected attempt. The body is
    /// discarded (`bytes_downloaded = 0`), so the row can never satisfy
    /// the verified-download predicate.
    async fn persist_failed_attempt(
        &self,
        url: &str,
        status: u16,
        content_type: Option<&str>,
        timing: Option<&HttpFetchResult>,
        started: Instant,
        source: &str,
        diagnostic: &str,
    ) -> i64 {
        let host = crate::util::urls::extract_host(url).unwrap_or_default();
        let url_id = match self.storage.intern_url(url, &host).await {
            Ok(id) => id,
            Err(e) => {
                warn!("failed to intern {url} while recording failure: {e:#}");
                return -1;
            }
        };

        let record = ResponseRecord {
            url_id,
            http_status: status,
            bytes_downloaded: 0,
            content_type: content_type.map(str::to_string),
            ttfb_ms: timing.map(|t| t.ttfb_ms),
            download_ms: Some(
                timing
                    .map(|t| t.download_ms)
                    .unwrap_or_else(|| started.elapsed().as_millis() as i64),
            ),
            fetch_source: source.to_string(),
            diagnostic: Some(diagnostic.to_string()),
        };

        match self.storage.record_response(&record).await {
            Ok(id) => id,
            Err(e) => {
                warn!("failed to record attempt for {url}: {e:#}");
                -1
            }
        }
    }

    fn record_breaker_failure(&self, host: &str, detail: &str) {
        let before_open = self.breaker.health(host).map(|h| h.state);
        let after = self.breaker.record_failure(host, detail);
        if after == crate::resilience::CircuitState::Open
            && before_open != Some(crate::resilience::CircuitState::Open)
        {
            let failures = self
                .breaker
                .health(host)
                .map(|h| h.consecutive_failures)
                .unwrap_or_default();
            self.bus.publish(&TaskEvent::BreakerOpen {
                host: host.to_string(),
                consecutive_failures: failures,
            });
        }
    }

    fn emit_page(&self, url: &str, source: FetchSource, status: u16, bytes: u64, download_ms: i64) {
        info!(
            "PAGE {url} source={} status={status} bytes={bytes} ms={download_ms}",
            source.as_str()
        );
        self.bus.publish(&TaskEvent::PageFetched {
            url: url.to_string(),
            source,
            http_status: status,
            bytes,
            download_ms,
        });
    }

    fn emit_failure(&self, url: &str, kind: FailureKind, detail: &str) {
        info!("PAGE-ERR {url} category={} {detail}", kind.category());
        self.bus.publish(&TaskEvent::PageFailed {
            url: url.to_string(),
            category: kind.category().to_string(),
            detail: detail.to_string(),
        });
    }
}
